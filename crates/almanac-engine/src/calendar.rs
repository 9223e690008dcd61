//! Merging per-event occurrences into one ordered calendar.
//!
//! Occurrences are totally ordered by `(start, source_id, sequence_index)`,
//! so events starting at the same instant always come out in the same order.
//! A calendar is immutable once built and can be shared between threads.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::event::{EventDefinition, EventId, Occurrence, Window};
use crate::expander::expand;

/// The ordered occurrences of one query's result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Calendar {
    recurrences: Vec<Occurrence>,
}

impl Calendar {
    /// Merge per-event occurrence sequences.
    ///
    /// Occurrences sharing an identity `(source_id, start)` are kept once.
    pub fn new<I, S>(series: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = Occurrence>,
    {
        let mut recurrences: Vec<Occurrence> = series.into_iter().flatten().collect();
        recurrences.sort_by(|a, b| {
            (a.start, &a.source_id, a.sequence_index).cmp(&(
                b.start,
                &b.source_id,
                b.sequence_index,
            ))
        });
        recurrences.dedup_by(|a, b| a.key() == b.key());
        Calendar { recurrences }
    }

    /// Expand every definition over `window` and merge the results.
    pub fn expand<'a, I>(definitions: I, window: &Window) -> Self
    where
        I: IntoIterator<Item = &'a EventDefinition>,
    {
        let calendar = Calendar::new(definitions.into_iter().map(|def| expand(def, window)));
        tracing::debug!(%window, count = calendar.len(), "merged calendar");
        calendar
    }

    /// All occurrences, in order.
    pub fn recurrences(&self) -> &[Occurrence] {
        &self.recurrences
    }

    pub fn into_recurrences(self) -> Vec<Occurrence> {
        self.recurrences
    }

    /// Keep only the first `limit` occurrences.
    pub fn truncate(mut self, limit: usize) -> Self {
        self.recurrences.truncate(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.recurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recurrences.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Occurrence> {
        self.recurrences.iter()
    }

    /// The occurrence identified by `(source_id, start)`.
    pub fn find(&self, source_id: &EventId, start: NaiveDateTime) -> Option<&Occurrence> {
        self.starting_at(start)
            .iter()
            .find(|occ| &occ.source_id == source_id)
    }

    /// Occurrences of one event definition, in order.
    pub fn for_event<'a>(
        &'a self,
        source_id: &'a EventId,
    ) -> impl Iterator<Item = &'a Occurrence> + 'a {
        self.iter().filter(move |occ| &occ.source_id == source_id)
    }

    /// Occurrences starting in `[from, to)`.
    pub fn between(&self, from: NaiveDateTime, to: NaiveDateTime) -> &[Occurrence] {
        let lo = self.recurrences.partition_point(|occ| occ.start < from);
        let hi = self.recurrences.partition_point(|occ| occ.start < to).max(lo);
        &self.recurrences[lo..hi]
    }

    /// Occurrences starting on `day`.
    pub fn on_day(&self, day: NaiveDate) -> &[Occurrence] {
        let from = day.and_time(NaiveTime::MIN);
        match day.succ_opt() {
            Some(next) => self.between(from, next.and_time(NaiveTime::MIN)),
            None => self.between(from, NaiveDateTime::MAX),
        }
    }

    /// Occurrences grouped by the day they start on.
    pub fn by_day(&self) -> BTreeMap<NaiveDate, Vec<&Occurrence>> {
        let mut days: BTreeMap<NaiveDate, Vec<&Occurrence>> = BTreeMap::new();
        for occ in &self.recurrences {
            days.entry(occ.day()).or_default().push(occ);
        }
        days
    }

    /// Occurrences tagged with `category`, in order.
    pub fn in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a Occurrence> + 'a {
        self.iter().filter(move |occ| occ.categories.contains(category))
    }

    fn starting_at(&self, start: NaiveDateTime) -> &[Occurrence] {
        let lo = self.recurrences.partition_point(|occ| occ.start < start);
        let hi = self.recurrences.partition_point(|occ| occ.start <= start);
        &self.recurrences[lo..hi]
    }
}

impl<'a> IntoIterator for &'a Calendar {
    type Item = &'a Occurrence;
    type IntoIter = std::slice::Iter<'a, Occurrence>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Calendar {
    type Item = Occurrence;
    type IntoIter = std::vec::IntoIter<Occurrence>;

    fn into_iter(self) -> Self::IntoIter {
        self.recurrences.into_iter()
    }
}
