//! The data-store collaborator.
//!
//! The engine never dictates a storage schema. It describes what it needs as a
//! [`StoreQuery`] over store-native field names (translated through
//! [`MetaKeys`](crate::config::MetaKeys)), and a backend answers with raw
//! [`StoreRecord`]s. Retries, pooling and caching belong to the backend.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::event::EventId;
use crate::timestamp::Timestamp;

// ── Records ─────────────────────────────────────────────────────────────────

/// A raw event record as the store holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: EventId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Store-native meta fields, keyed by store field name.
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl StoreRecord {
    pub fn new(id: impl Into<EventId>) -> Self {
        StoreRecord {
            id: id.into(),
            title: String::new(),
            body: String::new(),
            categories: Vec::new(),
            meta: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// The value of a meta field, treating null and empty values as unset.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.meta.get(key).filter(|v| !is_blank(v))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

// ── Queries ─────────────────────────────────────────────────────────────────

/// Comparison operator of a [`Filter::Compare`] clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A boolean filter over store-native meta fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Every clause must hold. An empty list matches everything.
    All(Vec<Filter>),
    /// At least one clause must hold. An empty list matches nothing.
    Any(Vec<Filter>),
    Compare {
        key: String,
        op: CompareOp,
        value: Value,
    },
    /// The field is set and non-empty.
    Exists { key: String },
    /// The field is unset or empty.
    Missing { key: String },
}

impl Filter {
    pub fn compare(key: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Filter::Exists { key: key.into() }
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Filter::Missing { key: key.into() }
    }

    /// Evaluate this filter against a record.
    ///
    /// Values that both parse as timestamps compare chronologically as
    /// wall-clock time in `tz` (bare dates as midnight, offsets converted).
    /// Numbers compare numerically, or as Unix seconds against a timestamp
    /// string. Anything else compares as text. A comparison against an unset
    /// field never matches.
    pub fn matches(&self, record: &StoreRecord, tz: &Tz) -> bool {
        match self {
            Filter::All(clauses) => clauses.iter().all(|c| c.matches(record, tz)),
            Filter::Any(clauses) => clauses.iter().any(|c| c.matches(record, tz)),
            Filter::Exists { key } => record.field(key).is_some(),
            Filter::Missing { key } => record.field(key).is_none(),
            Filter::Compare { key, op, value } => record
                .field(key)
                .and_then(|field| compare_values(field, value, tz))
                .is_some_and(|ordering| op.accepts(ordering)),
        }
    }
}

fn compare_values(left: &Value, right: &Value, tz: &Tz) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => {
            let parsed = Timestamp::parse(l, tz).zip(Timestamp::parse(r, tz));
            match parsed {
                Some((l, r)) => Some(l.start_of_day().cmp(&r.start_of_day())),
                None => Some(l.as_str().cmp(r.as_str())),
            }
        }
        (Value::Number(l), Value::String(r)) => {
            let r = Timestamp::parse(r, tz)?.start_of_day();
            Some(unix_seconds(l, tz)?.cmp(&r))
        }
        (Value::String(l), Value::Number(r)) => {
            let l = Timestamp::parse(l, tz)?.start_of_day();
            Some(l.cmp(&unix_seconds(r, tz)?))
        }
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Unix seconds as wall-clock time in `tz`.
fn unix_seconds(n: &serde_json::Number, tz: &Tz) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(n.as_i64()?, 0).map(|utc| utc.with_timezone(tz).naive_local())
}

/// What the engine asks a store for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreQuery {
    pub filter: Filter,
    /// Match records carrying any of these categories. Unfiltered when empty.
    pub categories: Vec<String>,
    /// Caller-supplied store-specific fields, forwarded untouched.
    pub passthrough: Map<String, Value>,
    /// Site timezone. Filter bounds are wall-clock times in this zone, and
    /// stored values carrying an offset or Unix seconds are read into it.
    pub timezone: Tz,
}

impl StoreQuery {
    /// Whether a record satisfies the filter and the category constraint.
    /// Passthrough fields are backend-specific and not considered.
    pub fn matches(&self, record: &StoreRecord) -> bool {
        let in_category = self.categories.is_empty()
            || record
                .categories
                .iter()
                .any(|c| self.categories.iter().any(|wanted| wanted == c));
        in_category && self.filter.matches(record, &self.timezone)
    }
}

// ── Stores ──────────────────────────────────────────────────────────────────

/// A source of raw event records.
pub trait EventStore {
    /// Fetch the records matching `query`. An empty result is not an error.
    fn fetch(&self, query: &StoreQuery) -> Result<Vec<StoreRecord>, StoreError>;
}

impl<T: EventStore + ?Sized> EventStore for &T {
    fn fetch(&self, query: &StoreQuery) -> Result<Vec<StoreRecord>, StoreError> {
        (**self).fetch(query)
    }
}

impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    fn fetch(&self, query: &StoreQuery) -> Result<Vec<StoreRecord>, StoreError> {
        (**self).fetch(query)
    }
}

/// A store backed by an in-memory list of records, evaluating queries with
/// [`StoreQuery::matches`]. Records are returned in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Vec<StoreRecord>,
}

impl InMemoryStore {
    pub fn new(records: Vec<StoreRecord>) -> Self {
        InMemoryStore { records }
    }

    /// Load records from a JSON array.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let records: Vec<StoreRecord> = serde_json::from_str(json).map_err(StoreError::new)?;
        Ok(InMemoryStore::new(records))
    }

    pub fn push(&mut self, record: StoreRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StoreRecord] {
        &self.records
    }
}

impl FromIterator<StoreRecord> for InMemoryStore {
    fn from_iter<I: IntoIterator<Item = StoreRecord>>(iter: I) -> Self {
        InMemoryStore::new(iter.into_iter().collect())
    }
}

impl EventStore for InMemoryStore {
    fn fetch(&self, query: &StoreQuery) -> Result<Vec<StoreRecord>, StoreError> {
        if !query.passthrough.is_empty() {
            tracing::trace!(
                fields = query.passthrough.len(),
                "in-memory store ignores passthrough fields"
            );
        }
        Ok(self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}
