//! Host-supplied configuration: the logical-field-to-store-key table, the site
//! timezone, and the hooks the host can inject.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::AlmanacError;
use crate::query::EventParams;
use crate::store::StoreRecord;
use crate::timestamp;

// ── Logical fields ──────────────────────────────────────────────────────────

/// A field the engine reads from stored records, independent of how the store
/// names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalField {
    Start,
    End,
    Until,
    Frequency,
    Exceptions,
    RecurrenceDescriptions,
}

impl LogicalField {
    pub const ALL: [LogicalField; 6] = [
        LogicalField::Start,
        LogicalField::End,
        LogicalField::Until,
        LogicalField::Frequency,
        LogicalField::Exceptions,
        LogicalField::RecurrenceDescriptions,
    ];

    /// Fields that must be mapped before any query can run.
    pub const REQUIRED: [LogicalField; 5] = [
        LogicalField::Start,
        LogicalField::End,
        LogicalField::Until,
        LogicalField::Frequency,
        LogicalField::Exceptions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogicalField::Start => "start",
            LogicalField::End => "end",
            LogicalField::Until => "until",
            LogicalField::Frequency => "frequency",
            LogicalField::Exceptions => "exceptions",
            LogicalField::RecurrenceDescriptions => "recurrence_descriptions",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalField {
    type Err = AlmanacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| AlmanacError::InvalidParameter(format!("unknown field '{s}'")))
    }
}

// ── MetaKeys ────────────────────────────────────────────────────────────────

/// Store-native field names for each logical field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct MetaKeys {
    keys: BTreeMap<LogicalField, String>,
}

impl MetaKeys {
    pub fn new() -> Self {
        MetaKeys::default()
    }

    /// Map `field` to the store key `key`.
    pub fn with(mut self, field: LogicalField, key: impl Into<String>) -> Self {
        self.keys.insert(field, key.into());
        self
    }

    /// Build from a loosely typed name → key mapping.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] for names that are not a
    /// logical field, or for blank store keys.
    pub fn from_map<I, K, V>(entries: I) -> Result<Self, AlmanacError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut keys = BTreeMap::new();
        for (name, key) in entries {
            let field: LogicalField = name.as_ref().parse()?;
            let key = key.into();
            if key.trim().is_empty() {
                return Err(AlmanacError::InvalidParameter(format!(
                    "blank store key for field '{field}'"
                )));
            }
            keys.insert(field, key);
        }
        Ok(MetaKeys { keys })
    }

    /// The configured store key for `field`, if any.
    pub fn get(&self, field: LogicalField) -> Option<&str> {
        self.keys.get(&field).map(String::as_str)
    }

    /// The configured store key for `field`.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] if the field is unmapped.
    pub fn require(&self, field: LogicalField) -> Result<&str, AlmanacError> {
        self.get(field).ok_or_else(|| {
            AlmanacError::InvalidParameter(format!(
                "meta key for field '{field}' is not configured"
            ))
        })
    }

    /// Check that every required field is mapped.
    pub fn validate(&self) -> Result<(), AlmanacError> {
        LogicalField::REQUIRED
            .into_iter()
            .try_for_each(|field| self.require(field).map(|_| ()))
    }

    /// Whether `store_key` is mapped to some logical field.
    pub fn is_mapped(&self, store_key: &str) -> bool {
        self.keys.values().any(|k| k == store_key)
    }
}

impl TryFrom<BTreeMap<String, String>> for MetaKeys {
    type Error = AlmanacError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        MetaKeys::from_map(map)
    }
}

impl From<MetaKeys> for BTreeMap<String, String> {
    fn from(meta_keys: MetaKeys) -> Self {
        meta_keys
            .keys
            .into_iter()
            .map(|(field, key)| (field.as_str().to_string(), key))
            .collect()
    }
}

// ── EventsConfig ────────────────────────────────────────────────────────────

/// Post-fetch record shaping, applied to every record before decoding.
pub type RecordShaper = Arc<dyn Fn(StoreRecord) -> StoreRecord + Send + Sync>;

/// Receives every parameter error reported by [`get_events`](crate::get_events).
pub type ErrorReporter = Arc<dyn Fn(&AlmanacError, &EventParams) + Send + Sync>;

/// Everything the host configures once and shares across queries.
#[derive(Clone)]
pub struct EventsConfig {
    meta_keys: MetaKeys,
    timezone: Tz,
    record_shaper: Option<RecordShaper>,
    error_reporter: Option<ErrorReporter>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    meta_keys: MetaKeys,
    #[serde(default)]
    timezone: Option<String>,
}

impl EventsConfig {
    /// Configuration with the given key table, in UTC.
    pub fn new(meta_keys: MetaKeys) -> Self {
        EventsConfig {
            meta_keys,
            timezone: Tz::UTC,
            record_shaper: None,
            error_reporter: None,
        }
    }

    /// Parse a JSON document of the form
    /// `{"meta_keys": {"start": "..", ..}, "timezone": "Europe/Paris"}`.
    ///
    /// # Errors
    ///
    /// Returns [`AlmanacError::InvalidParameter`] for malformed JSON, unknown
    /// keys or an unknown timezone.
    pub fn from_json(json: &str) -> Result<Self, AlmanacError> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| AlmanacError::InvalidParameter(format!("configuration: {e}")))?;
        let mut config = EventsConfig::new(raw.meta_keys);
        if let Some(name) = raw.timezone {
            config.timezone = timestamp::parse_timezone(&name)?;
        }
        Ok(config)
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_record_shaper<F>(mut self, shaper: F) -> Self
    where
        F: Fn(StoreRecord) -> StoreRecord + Send + Sync + 'static,
    {
        self.record_shaper = Some(Arc::new(shaper));
        self
    }

    pub fn with_error_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&AlmanacError, &EventParams) + Send + Sync + 'static,
    {
        self.error_reporter = Some(Arc::new(reporter));
        self
    }

    pub fn meta_keys(&self) -> &MetaKeys {
        &self.meta_keys
    }

    pub fn timezone(&self) -> &Tz {
        &self.timezone
    }

    pub(crate) fn shape(&self, record: StoreRecord) -> StoreRecord {
        match &self.record_shaper {
            Some(shaper) => shaper(record),
            None => record,
        }
    }

    pub(crate) fn report(&self, error: &AlmanacError, params: &EventParams) {
        if let Some(reporter) = &self.error_reporter {
            reporter(error, params);
        }
    }
}

impl fmt::Debug for EventsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventsConfig")
            .field("meta_keys", &self.meta_keys)
            .field("timezone", &self.timezone)
            .field("record_shaper", &self.record_shaper.is_some())
            .field("error_reporter", &self.error_reporter.is_some())
            .finish()
    }
}
