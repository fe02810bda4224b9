//! Normalization of CouchDB failures into [`DatabankError`]s.
//!
//! Every backend call site names the [`Operation`] it performed. The operation
//! carries the identifiers worth reporting and renders the message that wraps
//! the raw CouchDB error.

use crate::error::CouchError;
use crate::key::document_key;
use docbank_storage::DatabankError;
use std::fmt;
use tracing::warn;

/// A backend-facing step whose failure gets reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    ClearTestDatabase { location: &'a str, database: &'a str },
    Connect { location: &'a str, database: &'a str },
    Delete { kind: &'a str, id: &'a str },
    Read { kind: &'a str, id: &'a str },
    ReadDocument { key: &'a str },
    ReadAll { kind: &'a str },
    SaveDocument { key: &'a str },
    Search { kind: &'a str },
}

/// Either an error already in the storage taxonomy or a raw CouchDB one.
#[derive(Debug)]
pub enum Failure {
    Normalized(DatabankError),
    Couch(CouchError),
}

impl From<DatabankError> for Failure {
    fn from(err: DatabankError) -> Self {
        Self::Normalized(err)
    }
}

impl From<CouchError> for Failure {
    fn from(err: CouchError) -> Self {
        Self::Couch(err)
    }
}

impl Operation<'_> {
    /// Whether failures of this operation mean the connection couldn't be set up.
    fn is_connection_setup(&self) -> bool {
        matches!(
            self,
            Operation::ClearTestDatabase { .. } | Operation::Connect { .. }
        )
    }

    /// Normalize a failure of this operation.
    ///
    /// Errors already in the storage taxonomy pass through unchanged. Raw
    /// CouchDB errors are wrapped once, with the raw error appended as JSON.
    pub fn translate(&self, failure: impl Into<Failure>) -> DatabankError {
        let err = match failure.into() {
            Failure::Normalized(err) => return err,
            Failure::Couch(err) => err,
        };

        let raw = serde_json::to_string(&err).unwrap_or_else(|_| err.to_string());
        let message = format!("{self}: {raw}");
        warn!(error = %err.error, reason = %err.reason, "{}", self);

        if self.is_connection_setup() {
            DatabankError::connection_failed(message)
        } else {
            DatabankError::backend(message)
        }
    }
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ClearTestDatabase { location, database } => write!(
                f,
                "CouchDB cannot create the test database {database} at {location}"
            ),
            Operation::Connect { location, database } => write!(
                f,
                "CouchDB cannot connect to database {database} at {location}"
            ),
            Operation::Delete { kind, id } => write!(
                f,
                "CouchDB error deleting document {}",
                document_key(kind, id)
            ),
            Operation::Read { kind, id } => write!(
                f,
                "CouchDB error while reading document {}",
                document_key(kind, id)
            ),
            Operation::ReadDocument { key } => {
                write!(f, "CouchDB error while reading document {key}")
            }
            Operation::ReadAll { kind } => {
                write!(f, "CouchDB error while reading all {kind} documents")
            }
            Operation::SaveDocument { key } => {
                write!(f, "CouchDB error while saving document {key}")
            }
            Operation::Search { kind } => write!(f, "CouchDB error while searching for a {kind}"),
        }
    }
}
