//! Error types for the CouchDB adapter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for raw CouchDB calls.
pub type CouchResult<T> = Result<T, CouchError>;

/// An error reported by CouchDB (or by the transport talking to it).
///
/// Mirrors CouchDB's JSON error body, `{"error": "...", "reason": "..."}`,
/// plus the HTTP status when there was one. Serialized as JSON when embedded
/// in normalized error messages.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error}: {reason}")]
pub struct CouchError {
    /// HTTP status code, absent for transport failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// CouchDB error code, e.g. `not_found` or `conflict`.
    pub error: String,
    /// Human-readable detail.
    #[serde(default)]
    pub reason: String,
}

impl CouchError {
    pub fn new(status: Option<u16>, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(Some(404), "not_found", reason)
    }

    pub fn conflict() -> Self {
        Self::new(Some(409), "conflict", "Document update conflict.")
    }

    /// The request never produced a response.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(None, "transport", err.to_string())
    }

    /// The response body could not be decoded.
    pub fn invalid_response(err: impl std::fmt::Display) -> Self {
        Self::new(None, "invalid_response", err.to_string())
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(None, "invalid_config", reason)
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// Uses CouchDB's JSON body when present and falls back to the status.
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Body {
            error: String,
            #[serde(default)]
            reason: String,
        }

        match serde_json::from_str::<Body>(body) {
            Ok(parsed) => Self::new(Some(status), parsed.error, parsed.reason),
            Err(_) => {
                let error = match status {
                    401 => "unauthorized",
                    404 => "not_found",
                    409 => "conflict",
                    412 => "file_exists",
                    _ => "http_error",
                };
                Self::new(Some(status), error, body.trim())
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.error == "not_found"
    }

    pub fn is_conflict(&self) -> bool {
        self.error == "conflict"
    }
}

/// Configuration-loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading a config file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },
}
