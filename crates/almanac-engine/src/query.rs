//! Event queries: parameter validation, window resolution, and fetching raw
//! definitions from a store.
//!
//! All parameters are validated when the query is built. A query that exists
//! is well-formed; only the store fetch or stored data can fail afterwards.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{EventsConfig, LogicalField};
use crate::error::{AlmanacError, Result};
use crate::event::{EventDefinition, Window};
use crate::rule::Frequency;
use crate::store::{CompareOp, EventStore, Filter, StoreQuery, StoreRecord};
use crate::timestamp::{self, Timestamp};

const STORE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const STORE_DATE_FORMAT: &str = "%Y-%m-%d";

// ── EventParams ─────────────────────────────────────────────────────────────

/// Caller-supplied query parameters. Unknown keys are rejected when
/// deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventParams {
    /// Reference "now". Defaults to the current time in the site timezone.
    pub current_time: Option<String>,
    /// A `YYYY-MM` month to query.
    pub event_month: Option<String>,
    /// Start of an explicit range, instead of `event_month`.
    pub start_date: Option<String>,
    /// End of an explicit range. A bare date is inclusive.
    pub end_date: Option<String>,
    /// Drop occurrences earlier than `current_time` when the window contains it.
    pub truncate_current_month: bool,
    /// Return expanded occurrences rather than whole definitions.
    pub expand_recurrences: bool,
    /// Match events in any of these categories.
    pub event_category: Vec<String>,
    /// Cap on the number of returned results.
    pub limit: Option<usize>,
    /// Store-specific query fields, forwarded untouched.
    pub query: Map<String, Value>,
}

impl Default for EventParams {
    fn default() -> Self {
        EventParams {
            current_time: None,
            event_month: None,
            start_date: None,
            end_date: None,
            truncate_current_month: false,
            expand_recurrences: true,
            event_category: Vec::new(),
            limit: None,
            query: Map::new(),
        }
    }
}

impl EventParams {
    pub fn new() -> Self {
        EventParams::default()
    }

    /// Parse parameters from a JSON value such as a decoded request body.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] for unknown keys or
    /// mistyped values.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| AlmanacError::InvalidParameter(e.to_string()))
    }

    pub fn current_time(mut self, current_time: impl Into<String>) -> Self {
        self.current_time = Some(current_time.into());
        self
    }

    pub fn event_month(mut self, month: impl Into<String>) -> Self {
        self.event_month = Some(month.into());
        self
    }

    pub fn date_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.end_date = Some(end.into());
        self
    }

    pub fn truncate_current_month(mut self, truncate: bool) -> Self {
        self.truncate_current_month = truncate;
        self
    }

    pub fn expand_recurrences(mut self, expand: bool) -> Self {
        self.expand_recurrences = expand;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.event_category.push(category.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn passthrough(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }
}

// ── EventQuery ──────────────────────────────────────────────────────────────

/// A validated event query, ready to run against a store.
///
/// Always yields raw definitions; expanding them is the caller's next step.
#[derive(Debug, Clone)]
pub struct EventQuery<'c> {
    config: &'c EventsConfig,
    current_time: NaiveDateTime,
    window: Window,
    categories: Vec<String>,
    passthrough: Map<String, Value>,
}

impl<'c> EventQuery<'c> {
    /// Validate `params` against `config` and resolve the query window.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] for malformed timestamps or
    /// months, conflicting or inverted ranges, blank categories, a zero
    /// limit, or an incomplete meta key table.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(params: &EventParams, config: &'c EventsConfig) -> Result<Self> {
        config.meta_keys().validate()?;
        let tz = config.timezone();

        let current_time = match params.current_time.as_deref() {
            Some(raw) => parse_param("current_time", raw, tz)?.start_of_day(),
            None => timestamp::now_in(tz),
        };

        let mut window = resolve_window(params, current_time, tz)?;
        if params.truncate_current_month && window.contains(current_time) {
            window = window.clamp_from(current_time);
        }

        let categories = normalize_categories(&params.event_category)?;

        if params.limit == Some(0) {
            return Err(AlmanacError::InvalidParameter(
                "limit must be at least 1".to_string(),
            ));
        }

        tracing::debug!(%window, %current_time, categories = categories.len(), "resolved event query");

        Ok(EventQuery {
            config,
            current_time,
            window,
            categories,
            passthrough: params.query.clone(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn current_time(&self) -> NaiveDateTime {
        self.current_time
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// The store query selecting every definition that could produce an
    /// occurrence in the window:
    ///
    /// `start < to AND (start ≥ from OR end ≥ from OR (recurring AND (no until OR until ≥ from)))`
    ///
    /// Lower-bound comparisons use the window's first day, so the store may
    /// over-select; expansion applies the exact bounds. Bounds are wall-clock
    /// times in the site timezone, which the query carries.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] if a required meta key is
    /// unmapped.
    pub fn store_query(&self) -> Result<StoreQuery> {
        let keys = self.config.meta_keys();
        let start = keys.require(LogicalField::Start)?;
        let end = keys.require(LogicalField::End)?;
        let until = keys.require(LogicalField::Until)?;
        let frequency = keys.require(LogicalField::Frequency)?;

        let to = self.window.to().format(STORE_DATETIME_FORMAT).to_string();
        let from_day = self.window.from().format(STORE_DATE_FORMAT).to_string();

        let recurring = Filter::All(vec![
            Filter::exists(frequency),
            Filter::compare(frequency, CompareOp::Ne, Frequency::None.as_str()),
            Filter::Any(vec![
                Filter::missing(until),
                Filter::compare(until, CompareOp::Ge, from_day.clone()),
            ]),
        ]);

        let filter = Filter::All(vec![
            Filter::compare(start, CompareOp::Lt, to),
            Filter::Any(vec![
                Filter::compare(start, CompareOp::Ge, from_day.clone()),
                Filter::compare(end, CompareOp::Ge, from_day),
                recurring,
            ]),
        ]);

        Ok(StoreQuery {
            filter,
            categories: self.categories.clone(),
            passthrough: self.passthrough.clone(),
            timezone: *self.config.timezone(),
        })
    }

    /// Fetch and decode the matching definitions.
    ///
    /// # Errors
    ///
    /// Store failures propagate as [`AlmanacError::Store`] without retry.
    /// Records that cannot be decoded yield [`AlmanacError::InvalidDefinition`].
    #[tracing::instrument(level = "debug", skip_all, fields(window = %self.window))]
    pub fn get_results<S: EventStore + ?Sized>(&self, store: &S) -> Result<Vec<EventDefinition>> {
        let records = store.fetch(&self.store_query()?)?;
        tracing::debug!(count = records.len(), "fetched event records");

        records
            .into_iter()
            .map(|record| decode_record(self.config.shape(record), self.config))
            .collect()
    }
}

fn parse_param(name: &str, raw: &str, tz: &Tz) -> Result<Timestamp> {
    Timestamp::parse(raw, tz).ok_or_else(|| {
        AlmanacError::InvalidParameter(format!("malformed {name} '{raw}'"))
    })
}

fn resolve_window(params: &EventParams, current_time: NaiveDateTime, tz: &Tz) -> Result<Window> {
    let start = params.start_date.as_deref();
    let end = params.end_date.as_deref();

    if let Some(month) = params.event_month.as_deref() {
        if start.is_some() || end.is_some() {
            return Err(AlmanacError::InvalidParameter(
                "event_month cannot be combined with start_date or end_date".to_string(),
            ));
        }
        let (year, month) = timestamp::parse_year_month(month).ok_or_else(|| {
            AlmanacError::InvalidParameter(format!(
                "malformed event_month '{month}': expected YYYY-MM"
            ))
        })?;
        return Window::month(year, month);
    }

    let from = match start {
        Some(raw) => parse_param("start_date", raw, tz)?.start_of_day(),
        None => timestamp::month_start_of(current_time).ok_or_else(out_of_range)?,
    };
    let to = match end {
        Some(raw) => parse_param("end_date", raw, tz)?
            .exclusive_end()
            .ok_or_else(out_of_range)?,
        None if start.is_some() => timestamp::month_end_of(from).ok_or_else(out_of_range)?,
        None => timestamp::month_end_of(current_time).ok_or_else(out_of_range)?,
    };
    Window::new(from, to)
}

fn out_of_range() -> AlmanacError {
    AlmanacError::InvalidParameter("date is out of the supported range".to_string())
}

fn normalize_categories(raw: &[String]) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut categories = Vec::with_capacity(raw.len());
    for category in raw {
        let category = category.trim();
        if category.is_empty() {
            return Err(AlmanacError::InvalidParameter(
                "event_category entries must not be blank".to_string(),
            ));
        }
        if seen.insert(category) {
            categories.push(category.to_string());
        }
    }
    Ok(categories)
}

// ── Record decoding ─────────────────────────────────────────────────────────

/// Decode a store record into a definition through the configured meta keys.
fn decode_record(record: StoreRecord, config: &EventsConfig) -> Result<EventDefinition> {
    let keys = config.meta_keys();
    let tz = config.timezone();
    let invalid = |what: String| AlmanacError::InvalidDefinition(format!("event {}: {what}", record.id));
    let field = |logical: LogicalField| keys.get(logical).and_then(|key| record.field(key));

    let start = field(LogicalField::Start)
        .ok_or_else(|| invalid("missing start".to_string()))?;
    let start = field_timestamp(start, tz)
        .ok_or_else(|| invalid(format!("malformed start {start}")))?
        .start_of_day();

    let mut builder = EventDefinition::builder(record.id.clone(), start)
        .title(record.title.clone())
        .body(record.body.clone())
        .categories(record.categories.iter().cloned());

    if let Some(end) = field(LogicalField::End) {
        let end = field_timestamp(end, tz).ok_or_else(|| invalid(format!("malformed end {end}")))?;
        builder = builder.end(end.end_of_day());
    }

    if let Some(frequency) = field(LogicalField::Frequency) {
        let name = frequency
            .as_str()
            .ok_or_else(|| invalid(format!("malformed frequency {frequency}")))?;
        let frequency = name
            .parse::<Frequency>()
            .map_err(|_| invalid(format!("unknown frequency '{}'", name.trim())))?;
        builder = builder.frequency(frequency);
    }

    if let Some(until) = field(LogicalField::Until) {
        let until =
            field_timestamp(until, tz).ok_or_else(|| invalid(format!("malformed until {until}")))?;
        builder = builder.until(until.end_of_day());
    }

    if let Some(exceptions) = field(LogicalField::Exceptions) {
        for raw in list_items(exceptions) {
            let day = raw
                .and_then(|s| Timestamp::parse(s, tz))
                .ok_or_else(|| invalid(format!("malformed exceptions {exceptions}")))?;
            builder = builder.exception(day.start_of_day().date());
        }
    }

    if let Some(descriptions) = field(LogicalField::RecurrenceDescriptions) {
        let text: Option<Vec<&str>> = list_items(descriptions).collect();
        let text = text.ok_or_else(|| {
            invalid(format!("malformed recurrence_descriptions {descriptions}"))
        })?;
        builder = builder.recurrence_description(text.join("; "));
    }

    let metadata: Map<String, Value> = record
        .meta
        .iter()
        .filter(|(key, _)| !keys.is_mapped(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    builder.metadata(metadata).build()
}

/// A timestamp from a string field, or from Unix seconds.
fn field_timestamp(value: &Value, tz: &Tz) -> Option<Timestamp> {
    match value {
        Value::String(s) => Timestamp::parse(s, tz),
        Value::Number(n) => {
            let utc = DateTime::from_timestamp(n.as_i64()?, 0)?;
            Some(Timestamp::DateTime(utc.with_timezone(tz).naive_local()))
        }
        _ => None,
    }
}

/// Items of a list field: a JSON array of strings, or one comma-separated
/// string. Empty and null items are skipped in both forms; other non-string
/// array items yield `None`.
fn list_items(value: &Value) -> Box<dyn Iterator<Item = Option<&str>> + '_> {
    match value {
        Value::Array(items) => Box::new(
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| item.as_str().map(str::trim))
                .filter(|item| *item != Some("")),
        ),
        Value::String(s) => Box::new(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(Some),
        ),
        _ => Box::new(std::iter::once(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetaKeys;
    use crate::error::StoreError;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use serde_json::json;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn keys() -> MetaKeys {
        MetaKeys::new()
            .with(LogicalField::Start, "start")
            .with(LogicalField::End, "end")
            .with(LogicalField::Until, "until")
            .with(LogicalField::Frequency, "frequency")
            .with(LogicalField::Exceptions, "exceptions")
            .with(LogicalField::RecurrenceDescriptions, "recurrence_notes")
    }

    fn config() -> EventsConfig {
        EventsConfig::new(keys())
    }

    fn params() -> EventParams {
        EventParams::new().current_time("2020-03-15 12:00:00")
    }

    // ── Parameters ──────────────────────────────────────────────────────

    #[test]
    fn test_params_default_expands_recurrences() {
        assert!(EventParams::default().expand_recurrences);
        let parsed = EventParams::from_value(json!({"event_month": "2020-03"})).unwrap();
        assert!(parsed.expand_recurrences);
        assert_eq!(parsed.event_month.as_deref(), Some("2020-03"));
    }

    #[test]
    fn test_params_reject_unknown_keys() {
        let err = EventParams::from_value(json!({"event_mnth": "2020-03"})).unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(err.to_string().contains("event_mnth"), "got: {err}");
    }

    #[test]
    fn test_params_reject_mistyped_values() {
        let err = EventParams::from_value(json!({"truncate_current_month": "yes"})).unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    // ── Window resolution ───────────────────────────────────────────────

    #[test]
    fn test_default_window_is_current_month() {
        let config = config();
        let query = EventQuery::new(&params(), &config).unwrap();
        assert_eq!(*query.window(), Window::month(2020, 3).unwrap());
        assert_eq!(query.current_time(), dt("2020-03-15 12:00:00"));
    }

    #[test]
    fn test_current_time_defaults_to_now() {
        let config = config();
        let before = timestamp::now_in(config.timezone());
        let query = EventQuery::new(&EventParams::new(), &config).unwrap();
        assert!(query.current_time() >= before);
        assert!(query.window().contains(query.current_time()));
    }

    #[test]
    fn test_event_month_window() {
        let config = config();
        let query = EventQuery::new(&params().event_month("2021-02"), &config).unwrap();
        assert_eq!(query.window().from(), dt("2021-02-01 00:00:00"));
        assert_eq!(query.window().to(), dt("2021-03-01 00:00:00"));
    }

    #[test]
    fn test_malformed_event_month() {
        let config = config();
        for bad in ["2021-2", "Feb 2021", "2021-13"] {
            let err = EventQuery::new(&params().event_month(bad), &config).unwrap_err();
            assert!(err.is_invalid_parameter(), "{bad}");
            assert!(err.to_string().contains("event_month"), "got: {err}");
        }
    }

    #[test]
    fn test_malformed_current_time() {
        let config = config();
        let err = EventQuery::new(&EventParams::new().current_time("noonish"), &config).unwrap_err();
        assert!(err.to_string().contains("current_time"), "got: {err}");
    }

    #[test]
    fn test_date_range_end_date_is_inclusive() {
        let config = config();
        let query =
            EventQuery::new(&params().date_range("2020-03-10", "2020-03-12"), &config).unwrap();
        assert_eq!(query.window().from(), dt("2020-03-10 00:00:00"));
        assert_eq!(query.window().to(), dt("2020-03-13 00:00:00"));
    }

    #[test]
    fn test_start_date_alone_runs_to_month_end() {
        let config = config();
        let mut p = params();
        p.start_date = Some("2020-05-20".into());
        let query = EventQuery::new(&p, &config).unwrap();
        assert_eq!(query.window().from(), dt("2020-05-20 00:00:00"));
        assert_eq!(query.window().to(), dt("2020-06-01 00:00:00"));
    }

    #[test]
    fn test_end_date_alone_starts_at_current_month() {
        let config = config();
        let mut p = params();
        p.end_date = Some("2020-04-10".into());
        let query = EventQuery::new(&p, &config).unwrap();
        assert_eq!(query.window().from(), dt("2020-03-01 00:00:00"));
        assert_eq!(query.window().to(), dt("2020-04-11 00:00:00"));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let config = config();
        let err = EventQuery::new(&params().date_range("2020-03-12", "2020-03-10"), &config)
            .unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_month_and_range_conflict() {
        let config = config();
        let p = params().event_month("2020-03").date_range("2020-03-01", "2020-03-02");
        let err = EventQuery::new(&p, &config).unwrap_err();
        assert!(err.to_string().contains("cannot be combined"), "got: {err}");
    }

    #[test]
    fn test_truncate_current_month_clamps_lower_bound() {
        let config = config();
        let query = EventQuery::new(&params().truncate_current_month(true), &config).unwrap();
        assert_eq!(query.window().from(), dt("2020-03-15 12:00:00"));
        assert_eq!(query.window().to(), dt("2020-04-01 00:00:00"));
    }

    #[test]
    fn test_truncate_ignored_for_other_months() {
        let config = config();
        let p = params().truncate_current_month(true).event_month("2020-04");
        let query = EventQuery::new(&p, &config).unwrap();
        assert_eq!(*query.window(), Window::month(2020, 4).unwrap());
    }

    #[test]
    fn test_categories_are_trimmed_and_deduplicated() {
        let config = config();
        let p = params().category(" music ").category("music").category("art");
        let query = EventQuery::new(&p, &config).unwrap();
        assert_eq!(query.categories(), ["music", "art"]);

        let err = EventQuery::new(&params().category("  "), &config).unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let config = config();
        let err = EventQuery::new(&params().limit(0), &config).unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_missing_meta_key_is_invalid_parameter() {
        let config = EventsConfig::new(MetaKeys::new().with(LogicalField::Start, "start"));
        let err = EventQuery::new(&params(), &config).unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(err.to_string().contains("meta key"), "got: {err}");
    }

    #[test]
    fn test_current_time_with_offset_uses_site_timezone() {
        let config = config().with_timezone("Asia/Tokyo".parse().unwrap());
        let p = EventParams::new().current_time("2020-03-31T20:00:00Z");
        let query = EventQuery::new(&p, &config).unwrap();
        // 20:00 UTC is 05:00 the next day in Tokyo
        assert_eq!(query.current_time(), dt("2020-04-01 05:00:00"));
        assert_eq!(*query.window(), Window::month(2020, 4).unwrap());
    }

    // ── Store query ─────────────────────────────────────────────────────

    #[test]
    fn test_store_query_uses_store_keys() {
        let config = EventsConfig::new(
            MetaKeys::new()
                .with(LogicalField::Start, "ev_start")
                .with(LogicalField::End, "ev_end")
                .with(LogicalField::Until, "ev_until")
                .with(LogicalField::Frequency, "ev_freq")
                .with(LogicalField::Exceptions, "ev_skip"),
        );
        let p = params().category("music").passthrough("post_status", "publish");
        let query = EventQuery::new(&p, &config).unwrap();
        let store_query = query.store_query().unwrap();
        let json = serde_json::to_string(&store_query.filter).unwrap();
        for key in ["ev_start", "ev_end", "ev_until", "ev_freq"] {
            assert!(json.contains(key), "{key} missing from {json}");
        }
        assert!(json.contains("2020-04-01 00:00:00"));
        assert_eq!(store_query.categories, vec!["music".to_string()]);
        assert_eq!(store_query.passthrough["post_status"], "publish");
    }

    #[test]
    fn test_store_query_carries_site_timezone() {
        let config = config().with_timezone("America/New_York".parse().unwrap());
        let query = EventQuery::new(&params(), &config).unwrap();
        assert_eq!(query.store_query().unwrap().timezone, *config.timezone());
    }

    #[test]
    fn test_store_query_requires_mapped_keys() {
        let config = EventsConfig::new(MetaKeys::new().with(LogicalField::Start, "start"));
        let query = EventQuery {
            config: &config,
            current_time: dt("2020-03-15 12:00:00"),
            window: Window::month(2020, 3).unwrap(),
            categories: Vec::new(),
            passthrough: Map::new(),
        };
        let err = query.store_query().unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(err.to_string().contains("'end'"), "got: {err}");
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(vec![
            // single, in window
            StoreRecord::new("single").with_meta("start", "2020-03-20 19:00:00"),
            // single, before window
            StoreRecord::new("old")
                .with_meta("start", "2020-02-20 19:00:00")
                .with_meta("end", "2020-02-20 21:00:00"),
            // single, after window
            StoreRecord::new("later").with_meta("start", "2020-04-02 19:00:00"),
            // multi-day, started before window
            StoreRecord::new("festival")
                .with_meta("start", "2020-02-28 10:00:00")
                .with_meta("end", "2020-03-02 18:00:00"),
            // unbounded series from last year
            StoreRecord::new("weekly")
                .with_meta("start", "2019-06-03 09:00:00")
                .with_meta("frequency", "weekly"),
            // series that ended before the window
            StoreRecord::new("ended")
                .with_meta("start", "2019-06-03 09:00:00")
                .with_meta("frequency", "daily")
                .with_meta("until", "2020-02-01"),
            // explicit none frequency before window
            StoreRecord::new("none")
                .with_meta("start", "2019-06-03 09:00:00")
                .with_meta("frequency", "none"),
        ])
    }

    #[test]
    fn test_get_results_selects_candidates_for_window() {
        let config = config();
        let query = EventQuery::new(&params(), &config).unwrap();
        let results = query.get_results(&store()).unwrap();
        let ids: Vec<_> = results.iter().map(|d| d.id().as_str()).collect();
        assert_eq!(ids, vec!["single", "festival", "weekly"]);
    }

    #[test]
    fn test_get_results_can_be_empty() {
        let config = config();
        let query = EventQuery::new(&params().event_month("1999-01"), &config).unwrap();
        assert!(query.get_results(&store()).unwrap().is_empty());
    }

    struct FailingStore;

    impl EventStore for FailingStore {
        fn fetch(&self, _query: &StoreQuery) -> std::result::Result<Vec<StoreRecord>, StoreError> {
            Err(StoreError::new("database is locked"))
        }
    }

    #[test]
    fn test_store_error_propagates() {
        let config = config();
        let query = EventQuery::new(&params(), &config).unwrap();
        let err = query.get_results(&FailingStore).unwrap_err();
        assert!(matches!(err, AlmanacError::Store(_)));
        assert!(err.to_string().contains("database is locked"), "got: {err}");
    }

    // ── Decoding ────────────────────────────────────────────────────────

    #[test]
    fn test_decode_full_record() {
        let record = StoreRecord::new("5")
            .with_title("Choir")
            .with_body("<p>Bring music</p>")
            .with_category("music")
            .with_meta("start", "2020-03-02 19:00:00")
            .with_meta("end", "2020-03-02 21:00:00")
            .with_meta("frequency", "weekly")
            .with_meta("until", "2020-03-23")
            .with_meta("exceptions", json!(["2020-03-16", "2020-03-09 19:00:00"]))
            .with_meta("recurrence_notes", "Mondays, except holidays")
            .with_meta("venue", "Hall B");
        let def = decode_record(record, &config()).unwrap();
        assert_eq!(def.title(), "Choir");
        assert_eq!(def.body(), "<p>Bring music</p>");
        assert_eq!(def.end(), dt("2020-03-02 21:00:00"));
        assert_eq!(def.frequency(), Frequency::Weekly);
        // bare-date until covers the whole day
        assert_eq!(def.until(), Some(dt("2020-03-23 23:59:59")));
        assert!(def.is_exception(day("2020-03-16")));
        assert!(def.is_exception(day("2020-03-09")));
        assert_eq!(def.recurrence_description(), Some("Mondays, except holidays"));
        assert_eq!(def.metadata().len(), 1);
        assert_eq!(def.metadata()["venue"], "Hall B");
        assert!(def.categories().contains("music"));
    }

    #[test]
    fn test_decode_comma_separated_exceptions_and_unix_start() {
        let record = StoreRecord::new("6")
            // 2020-03-02T09:00:00Z
            .with_meta("start", 1_583_139_600)
            .with_meta("frequency", "Daily")
            .with_meta("exceptions", "2020-03-03, 2020-03-05");
        let def = decode_record(record, &config()).unwrap();
        assert_eq!(def.start(), dt("2020-03-02 09:00:00"));
        assert_eq!(def.frequency(), Frequency::Daily);
        assert_eq!(def.exceptions().len(), 2);
    }

    #[test]
    fn test_decode_skips_blank_exception_items_in_both_forms() {
        for exceptions in [
            json!(["2020-03-03", "", "  ", null]),
            json!("2020-03-03, , "),
        ] {
            let record = StoreRecord::new("7")
                .with_meta("start", "2020-03-02 09:00:00")
                .with_meta("frequency", "daily")
                .with_meta("exceptions", exceptions.clone());
            let def = decode_record(record, &config()).unwrap();
            let days: Vec<_> = def.exceptions().iter().copied().collect();
            assert_eq!(days, vec![day("2020-03-03")], "{exceptions}");
        }
    }

    #[test]
    fn test_decode_rejects_bad_records() {
        let config = config();
        let cases = [
            (StoreRecord::new("a"), "missing start"),
            (StoreRecord::new("b").with_meta("start", "soon"), "malformed start"),
            (
                StoreRecord::new("c")
                    .with_meta("start", "2020-03-02 10:00:00")
                    .with_meta("frequency", "fortnightly"),
                "fortnightly",
            ),
            (
                StoreRecord::new("d")
                    .with_meta("start", "2020-03-02 10:00:00")
                    .with_meta("end", "2020-03-01 10:00:00"),
                "before start",
            ),
            (
                StoreRecord::new("e")
                    .with_meta("start", "2020-03-02 10:00:00")
                    .with_meta("exceptions", json!(["2020-03-09", 7])),
                "malformed exceptions",
            ),
        ];
        for (record, expected) in cases {
            let id = record.id.clone();
            let err = decode_record(record, &config).unwrap_err();
            assert!(matches!(err, AlmanacError::InvalidDefinition(_)), "{id}");
            assert!(err.to_string().contains(expected), "{id}: got {err}");
        }
    }

    #[test]
    fn test_get_results_applies_record_shaper() {
        let config = config().with_record_shaper(|mut record| {
            record.title = record.title.to_uppercase();
            record
        });
        let store = InMemoryStore::new(vec![StoreRecord::new("1")
            .with_title("quiet hour")
            .with_meta("start", "2020-03-20 19:00:00")]);
        let query = EventQuery::new(&params(), &config).unwrap();
        let results = query.get_results(&store).unwrap();
        assert_eq!(results[0].title(), "QUIET HOUR");
    }
}
