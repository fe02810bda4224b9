//! Shared utilities for docbank.
//!
//! - Logging setup with tracing
//! - RAII-based timing for storage operations

pub mod log;
pub mod timing;

pub use log::{LogConfig, LogLevel};
pub use timing::TimingGuard;
