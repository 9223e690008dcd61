//! The entry points used by presentation layers (REST handlers, CLI commands,
//! template helpers).

use serde::Serialize;

use crate::calendar::Calendar;
use crate::config::{EventsConfig, LogicalField};
use crate::error::Result;
use crate::event::{EventDefinition, Occurrence};
use crate::query::{EventParams, EventQuery};
use crate::store::EventStore;

/// The result of [`get_events`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Events {
    /// Expanded occurrences, merged and ordered.
    Recurrences(Vec<Occurrence>),
    /// Whole definitions, ordered by start then id.
    Series(Vec<EventDefinition>),
}

impl Events {
    pub fn len(&self) -> usize {
        match self {
            Events::Recurrences(occurrences) => occurrences.len(),
            Events::Series(definitions) => definitions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Query events by month, date range, category, or store-specific fields.
///
/// Returns `Ok(None)` when the parameters are invalid or nothing matches.
/// Invalid parameters are also logged and passed to the configured error
/// reporter.
///
/// "Nothing matches" covers two cases that both yield `Ok(None)`: the store
/// returned no definitions, or definitions matched but every occurrence in
/// the window was suppressed by exception dates or the until bound. Use
/// [`EventQuery::get_results`] directly to tell them apart.
///
/// # Errors
///
/// Store failures and undecodable records propagate unchanged.
///
/// # Examples
///
/// ```
/// use almanac_engine::{
///     get_events, EventParams, Events, EventsConfig, InMemoryStore, LogicalField, MetaKeys,
///     StoreRecord,
/// };
///
/// let config = EventsConfig::new(
///     MetaKeys::new()
///         .with(LogicalField::Start, "start")
///         .with(LogicalField::End, "end")
///         .with(LogicalField::Until, "until")
///         .with(LogicalField::Frequency, "frequency")
///         .with(LogicalField::Exceptions, "exceptions"),
/// );
/// let store = InMemoryStore::new(vec![StoreRecord::new("1")
///     .with_title("Book club")
///     .with_meta("start", "2020-03-04 18:00:00")
///     .with_meta("frequency", "weekly")]);
///
/// let params = EventParams::new().event_month("2020-03");
/// let Some(Events::Recurrences(occurrences)) = get_events(&params, &config, &store).unwrap() else {
///     panic!("expected recurrences");
/// };
/// assert_eq!(occurrences.len(), 4);
///
/// let bad = EventParams::new().event_month("March");
/// assert!(get_events(&bad, &config, &store).unwrap().is_none());
/// ```
#[tracing::instrument(level = "debug", skip_all)]
pub fn get_events<S: EventStore + ?Sized>(
    params: &EventParams,
    config: &EventsConfig,
    store: &S,
) -> Result<Option<Events>> {
    let query = match EventQuery::new(params, config) {
        Ok(query) => query,
        Err(err) if err.is_invalid_parameter() => {
            tracing::warn!(error = %err, "rejected event query");
            config.report(&err, params);
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let definitions = query.get_results(store)?;
    if definitions.is_empty() {
        tracing::debug!(window = %query.window(), "no matching events");
        return Ok(None);
    }

    let events = if params.expand_recurrences {
        let mut calendar = Calendar::expand(&definitions, query.window());
        if let Some(limit) = params.limit {
            calendar = calendar.truncate(limit);
        }
        if calendar.is_empty() {
            return Ok(None);
        }
        Events::Recurrences(calendar.into_recurrences())
    } else {
        let mut definitions = definitions;
        definitions.sort_by(|a, b| (a.start(), a.id()).cmp(&(b.start(), b.id())));
        if let Some(limit) = params.limit {
            definitions.truncate(limit);
        }
        Events::Series(definitions)
    };

    tracing::debug!(count = events.len(), "returning events");
    Ok(Some(events))
}

/// The configured store key for a logical field name such as `"start"` or
/// `"recurrence_descriptions"`.
///
/// # Errors
///
/// Returns [`AlmanacError::InvalidParameter`](crate::AlmanacError::InvalidParameter)
/// for an unknown field name or an unmapped field.
pub fn meta_key<'c>(field: &str, config: &'c EventsConfig) -> Result<&'c str> {
    let field: LogicalField = field.parse()?;
    config.meta_keys().require(field)
}
