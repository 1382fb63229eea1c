//! Error types for record operations.

use crate::observers::Event;
use thiserror::Error;

/// Boxed error returned by injected getters, setters and observers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A mapping was required but something else was produced.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Getter failed: {0}")]
    Getter(#[source] BoxError),

    /// The setter failed; the record keeps its pre-commit state.
    #[error("Setter failed: {0}")]
    Setter(#[source] BoxError),

    #[error("Observer failed during {event:?}: {source}")]
    Observer {
        event: Event,
        #[source]
        source: BoxError,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self {
        RecordError::Serialization(e.to_string())
    }
}

/// Result type for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;
