//! Recurrence expansion: one event definition → its concrete occurrences
//! within a window.
//!
//! Expansion is pure. The same definition and window always produce the same
//! occurrences, and the window's upper bound guarantees termination even for
//! series without an until bound.
//!
//! Sequence indices count steps from the definition's start, including steps
//! before the window and steps suppressed by exception dates, so two
//! overlapping windows agree on the index of any given occurrence.

use chrono::NaiveDateTime;

use crate::event::{EventDefinition, Occurrence, Window};

/// Expand `definition` into the ordered occurrences that start inside `window`.
///
/// # Examples
///
/// ```
/// use almanac_engine::{expand, EventDefinition, Frequency, Window};
/// use chrono::NaiveDate;
///
/// let start = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// let def = EventDefinition::builder("1", start)
///     .frequency(Frequency::Weekly)
///     .exception(NaiveDate::from_ymd_opt(2020, 3, 16).unwrap())
///     .build()
///     .unwrap();
///
/// let occurrences = expand(&def, &Window::month(2020, 3).unwrap());
/// // 03-16 is suppressed but still consumes index 2
/// let indices: Vec<u32> = occurrences.iter().map(|o| o.sequence_index).collect();
/// assert_eq!(indices, vec![0, 1, 3, 4]);
/// ```
pub fn expand(definition: &EventDefinition, window: &Window) -> Vec<Occurrence> {
    let occurrences: Vec<Occurrence> = recurrences(definition, window).collect();
    tracing::trace!(
        event = %definition.id(),
        frequency = %definition.frequency(),
        %window,
        count = occurrences.len(),
        "expanded recurrences"
    );
    occurrences
}

/// Lazily enumerate the occurrences of `definition` inside `window`.
///
/// The iterator is finite and can be cloned to re-enumerate from the same
/// position.
pub fn recurrences<'a>(definition: &'a EventDefinition, window: &Window) -> Recurrences<'a> {
    debug_assert!(definition.end() >= definition.start());
    Recurrences {
        definition,
        window: *window,
        step: first_step(definition, window),
        done: false,
    }
}

/// Iterator returned by [`recurrences`].
#[derive(Debug, Clone)]
pub struct Recurrences<'a> {
    definition: &'a EventDefinition,
    window: Window,
    step: u32,
    done: bool,
}

impl Iterator for Recurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        let def = self.definition;

        if !def.is_recurring() {
            if self.done {
                return None;
            }
            self.done = true;
            return self
                .window
                .contains(def.start())
                .then(|| def.occurrence_at(def.start(), 0));
        }

        while !self.done {
            let Some(cursor) = def.frequency().nth(def.start(), self.step) else {
                self.done = true;
                break;
            };
            if cursor >= self.window.to() || def.until().is_some_and(|until| cursor > until) {
                self.done = true;
                break;
            }

            let index = self.step;
            match self.step.checked_add(1) {
                Some(next) => self.step = next,
                None => self.done = true,
            }

            if cursor >= self.window.from() && !def.is_exception(cursor.date()) {
                return Some(def.occurrence_at(cursor, index));
            }
        }
        None
    }
}

impl std::iter::FusedIterator for Recurrences<'_> {}

/// The first step worth evaluating for this window.
///
/// Fixed-length frequencies jump straight to the last step at or before
/// `window.from`; calendar-based ones start from the anchor.
fn first_step(definition: &EventDefinition, window: &Window) -> u32 {
    let Some(step_days) = definition.frequency().fixed_days() else {
        return 0;
    };
    let start: NaiveDateTime = definition.start();
    if window.from() <= start {
        return 0;
    }
    let gap_days = (window.from() - start).num_days();
    u32::try_from(gap_days / step_days).unwrap_or(u32::MAX)
}
