//! Storage error taxonomy.

use thiserror::Error;

/// Result type for storage operations.
pub type DatabankResult<T> = Result<T, DatabankError>;

/// Backend-independent storage errors.
///
/// Backends map their own failure vocabulary onto these variants so callers
/// can branch on them without knowing which backend is in use.
#[derive(Debug, Error)]
pub enum DatabankError {
    /// An operation was attempted without an open connection.
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called while a connection is open.
    #[error("Already connected")]
    AlreadyConnected,

    /// The addressed value doesn't exist.
    #[error("No such {kind}: {id}")]
    NoSuchThing { kind: String, id: String },

    /// The addressed value already exists.
    #[error("Already exists: {kind} {id}")]
    AlreadyExists { kind: String, id: String },

    /// The backend could not be reached or prepared while connecting.
    #[error("{message}")]
    ConnectionFailed { message: String },

    /// Any other backend failure, described for diagnosis.
    #[error("{message}")]
    Backend { message: String },

    /// A value could not be converted to or from JSON.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabankError {
    /// Create a no such thing error.
    pub fn no_such_thing(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NoSuchThing {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a generic backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether this error reports a missing value.
    pub fn is_no_such_thing(&self) -> bool {
        matches!(self, Self::NoSuchThing { .. })
    }
}
