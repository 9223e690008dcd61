//! Event definitions, their derived occurrences, and query windows.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AlmanacError;
use crate::rule::Frequency;
use crate::timestamp;

// ── EventId ─────────────────────────────────────────────────────────────────

/// Store-owned identifier of an event definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        EventId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId::new(s)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}

// ── EventDefinition ─────────────────────────────────────────────────────────

/// One stored event, possibly describing a whole recurring series.
///
/// Only constructible through [`EventDefinition::builder`], which guarantees
/// `end >= start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDefinition {
    id: EventId,
    title: String,
    body: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    frequency: Frequency,
    until: Option<NaiveDateTime>,
    exceptions: BTreeSet<NaiveDate>,
    categories: BTreeSet<String>,
    recurrence_description: Option<String>,
    metadata: Map<String, Value>,
}

impl EventDefinition {
    /// Start building a definition. `end` defaults to `start`.
    pub fn builder(id: impl Into<EventId>, start: NaiveDateTime) -> EventDefinitionBuilder {
        EventDefinitionBuilder {
            id: id.into(),
            title: String::new(),
            body: String::new(),
            start,
            end: None,
            frequency: Frequency::None,
            until: None,
            exceptions: BTreeSet::new(),
            categories: BTreeSet::new(),
            recurrence_description: None,
            metadata: Map::new(),
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn is_recurring(&self) -> bool {
        self.frequency.is_recurring()
    }

    /// The until bound, if the series has one. Always `None` for
    /// non-recurring events.
    pub fn until(&self) -> Option<NaiveDateTime> {
        self.until.filter(|_| self.is_recurring())
    }

    /// Suppressed days. Always empty for non-recurring events.
    pub fn exceptions(&self) -> &BTreeSet<NaiveDate> {
        static EMPTY: BTreeSet<NaiveDate> = BTreeSet::new();
        if self.is_recurring() {
            &self.exceptions
        } else {
            &EMPTY
        }
    }

    pub fn is_exception(&self, day: NaiveDate) -> bool {
        self.is_recurring() && self.exceptions.contains(&day)
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    pub fn recurrence_description(&self) -> Option<&str> {
        self.recurrence_description.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Build the occurrence of this definition starting at `start`.
    pub(crate) fn occurrence_at(&self, start: NaiveDateTime, sequence_index: u32) -> Occurrence {
        Occurrence {
            source_id: self.id.clone(),
            start,
            end: start
                .checked_add_signed(self.duration())
                .unwrap_or(NaiveDateTime::MAX),
            sequence_index,
            title: self.title.clone(),
            body: self.body.clone(),
            frequency: self.frequency,
            categories: self.categories.clone(),
            recurrence_description: self.recurrence_description.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Builder for [`EventDefinition`].
#[derive(Debug, Clone)]
pub struct EventDefinitionBuilder {
    id: EventId,
    title: String,
    body: String,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    frequency: Frequency,
    until: Option<NaiveDateTime>,
    exceptions: BTreeSet<NaiveDate>,
    categories: BTreeSet<String>,
    recurrence_description: Option<String>,
    metadata: Map<String, Value>,
}

impl EventDefinitionBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn end(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn until(mut self, until: NaiveDateTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn exception(mut self, day: NaiveDate) -> Self {
        self.exceptions.insert(day);
        self
    }

    pub fn exceptions(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.exceptions.extend(days);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn recurrence_description(mut self, description: impl Into<String>) -> Self {
        self.recurrence_description = Some(description.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Validate and build the definition.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidDefinition`] if `end` is before `start`.
    pub fn build(self) -> Result<EventDefinition, AlmanacError> {
        let end = self.end.unwrap_or(self.start);
        if end < self.start {
            return Err(AlmanacError::InvalidDefinition(format!(
                "event {}: end {} is before start {}",
                self.id, end, self.start
            )));
        }

        Ok(EventDefinition {
            id: self.id,
            title: self.title,
            body: self.body,
            start: self.start,
            end,
            frequency: self.frequency,
            until: self.until,
            exceptions: self.exceptions,
            categories: self.categories,
            recurrence_description: self.recurrence_description,
            metadata: self.metadata,
        })
    }
}

// ── Occurrence ──────────────────────────────────────────────────────────────

/// One concrete instance of an event definition. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub source_id: EventId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Step number within the series, counted from the definition's start.
    /// Suppressed steps consume an index too.
    pub sequence_index: u32,
    pub title: String,
    pub body: String,
    pub frequency: Frequency,
    pub categories: BTreeSet<String>,
    pub recurrence_description: Option<String>,
    pub metadata: Map<String, Value>,
}

impl Occurrence {
    /// Identity of this occurrence: `(source_id, start)`.
    pub fn key(&self) -> (&EventId, NaiveDateTime) {
        (&self.source_id, self.start)
    }

    pub fn day(&self) -> NaiveDate {
        self.start.date()
    }
}

// ── Window ──────────────────────────────────────────────────────────────────

/// A half-open time range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    from: NaiveDateTime,
    to: NaiveDateTime,
}

impl Window {
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] if `from` is after `to`.
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Result<Self, AlmanacError> {
        if from > to {
            return Err(AlmanacError::InvalidParameter(format!(
                "window start {from} is after window end {to}"
            )));
        }
        Ok(Window { from, to })
    }

    /// The whole of the given month.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] for an out-of-range month.
    pub fn month(year: i32, month: u32) -> Result<Self, AlmanacError> {
        let bounds = timestamp::first_of_month(year, month)
            .zip(timestamp::first_of_next_month(year, month));
        let (from, to) = bounds.ok_or_else(|| {
            AlmanacError::InvalidParameter(format!("invalid month {year:04}-{month:02}"))
        })?;
        Ok(Window { from, to })
    }

    pub fn from(&self) -> NaiveDateTime {
        self.from
    }

    pub fn to(&self) -> NaiveDateTime {
        self.to
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.from <= instant && instant < self.to
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// This window with its lower bound raised to `from`, if that is later.
    pub fn clamp_from(self, from: NaiveDateTime) -> Self {
        Window {
            from: self.from.max(from).min(self.to),
            to: self.to,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}
