//! # almanac-engine
//!
//! Recurring event computation for calendar front ends.
//!
//! Given stored event definitions (a start, an end, an optional recurrence
//! frequency, an optional until bound and a set of exception dates), the
//! engine validates query parameters, fetches candidate definitions from a
//! store, expands each into its concrete occurrences within the requested
//! window, and merges everything into one ordered calendar.
//!
//! ## Modules
//!
//! - [`rule`] — Recurrence frequencies and date stepping
//! - [`event`] — Event definitions, occurrences, and query windows
//! - [`expander`] — Definition + window → ordered occurrences
//! - [`store`] — The data-store collaborator and an in-memory store
//! - [`config`] — Store key mapping, site timezone, and host hooks
//! - [`query`] — Parameter validation and candidate fetching
//! - [`calendar`] — Merged, ordered occurrence lists
//! - [`api`] — `get_events` and `meta_key`
//! - [`error`] — Error types

pub mod api;
pub mod calendar;
pub mod config;
pub mod error;
pub mod event;
pub mod expander;
pub mod query;
pub mod rule;
pub mod store;
mod timestamp;

pub use api::{get_events, meta_key, Events};
pub use calendar::Calendar;
pub use config::{ErrorReporter, EventsConfig, LogicalField, MetaKeys, RecordShaper};
pub use error::{AlmanacError, StoreError};
pub use event::{EventDefinition, EventDefinitionBuilder, EventId, Occurrence, Window};
pub use expander::{expand, recurrences, Recurrences};
pub use query::{EventParams, EventQuery};
pub use rule::Frequency;
pub use store::{CompareOp, EventStore, Filter, InMemoryStore, StoreQuery, StoreRecord};
