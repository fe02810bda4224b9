//! RAII-based timing utilities for measuring and logging operation durations.
//!
//! # Example
//!
//! ```rust,ignore
//! use docbank_util::timing::TimingGuard;
//!
//! async fn read(kind: &str, id: &str) {
//!     let _timing = TimingGuard::storage("read", format!("{kind}:{id}"));
//!     // ... backend round trip ...
//!     // Duration is logged when _timing is dropped
//! }
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// RAII guard that measures and logs the duration of an operation.
///
/// When dropped, logs the elapsed time since creation.
pub struct TimingGuard {
    /// Operation verb (e.g., "read", "search", "connect")
    operation: &'static str,
    /// What the operation acted on (a document key, a type, a database)
    target: String,
    start: Instant,
    /// Minimum duration to log at info level (below this uses debug)
    info_threshold_ms: u64,
    /// Minimum duration to log at warn level (for slow operations)
    warn_threshold_ms: u64,
}

impl TimingGuard {
    /// Create a new timing guard.
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        let target = target.into();
        debug!(operation, resource = %target, "Starting operation");
        Self {
            operation,
            target,
            start: Instant::now(),
            info_threshold_ms: 250,
            warn_threshold_ms: 5000,
        }
    }

    /// Create a timing guard for a storage operation.
    ///
    /// Storage calls are network round trips, so anything over a second is
    /// reported at info level.
    pub fn storage(operation: &'static str, target: impl Into<String>) -> Self {
        Self::new(operation, target).with_info_threshold(1000)
    }

    /// Set the threshold for info-level logging (in milliseconds).
    pub fn with_info_threshold(mut self, ms: u64) -> Self {
        self.info_threshold_ms = ms;
        self
    }

    /// Set the threshold for warn-level logging (in milliseconds).
    pub fn with_warn_threshold(mut self, ms: u64) -> Self {
        self.warn_threshold_ms = ms;
        self
    }

    /// Get the elapsed time so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis();

        if duration_ms >= self.warn_threshold_ms as u128 {
            warn!(
                operation = self.operation,
                resource = %self.target,
                duration_ms = duration_ms as u64,
                "Slow operation completed"
            );
        } else if duration_ms >= self.info_threshold_ms as u128 {
            info!(
                operation = self.operation,
                resource = %self.target,
                duration_ms = duration_ms as u64,
                "Operation completed"
            );
        } else {
            debug!(
                operation = self.operation,
                resource = %self.target,
                duration_ms = duration_ms as u64,
                "Operation completed"
            );
        }
    }
}
