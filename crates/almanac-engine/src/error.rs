//! Error types for almanac-engine operations.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlmanacError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid event definition: {0}")]
    InvalidDefinition(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AlmanacError {
    /// Whether this error stems from caller input rather than stored data or
    /// the store itself.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, AlmanacError::InvalidParameter(_))
    }
}

pub type Result<T> = std::result::Result<T, AlmanacError>;

/// Failure reported by an [`EventStore`](crate::store::EventStore) backend.
///
/// Wraps whatever error the backend produced so it reaches the caller
/// unchanged.
#[derive(Debug)]
pub struct StoreError {
    source: Box<dyn StdError + Send + Sync>,
}

impl StoreError {
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: source.into(),
        }
    }

    /// The backend error this wraps.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let source: &(dyn StdError + 'static) = &*self.source;
        Some(source)
    }
}
