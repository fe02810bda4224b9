//! Storage interface for docbank.
//!
//! This crate defines the backend-independent key-value contract that every
//! docbank backend implements:
//! - The [`Databank`] trait (connect, CRUD, search, batch read)
//! - The [`DatabankError`] taxonomy callers can branch on
//! - Dotted-path criteria helpers shared by backends
//! - An in-memory backend (for testing and as a reference)

pub mod criteria;
pub mod error;
pub mod ext;
pub mod memory;

pub use criteria::{lookup_path, matches, values_equal, Criteria};
pub use error::{DatabankError, DatabankResult};
pub use ext::DatabankExt;
pub use memory::MemoryDatabank;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Opaque connection parameters handed to [`Databank::connect`].
pub type ConnectParams = Map<String, Value>;

/// Result of [`Databank::read_all`]: every requested id, `None` when absent.
pub type ReadAllResult = BTreeMap<String, Option<Value>>;

/// A typed key-value store addressed by `(kind, id)` pairs.
///
/// `kind` names the type of the stored value (e.g. `"user"`), `id` identifies
/// one value of that type. Values are opaque JSON documents.
///
/// Every operation other than `connect` fails with
/// [`DatabankError::NotConnected`] before touching the backend when no
/// connection is open.
#[async_trait]
pub trait Databank: Send + Sync {
    /// Open the connection.
    ///
    /// Fails with [`DatabankError::AlreadyConnected`] if one is already open.
    async fn connect(&self, params: &ConnectParams) -> DatabankResult<()>;

    /// Close the connection.
    async fn disconnect(&self) -> DatabankResult<()>;

    /// Store a new value and return it.
    async fn create(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value>;

    /// Read a stored value.
    ///
    /// Fails with [`DatabankError::NoSuchThing`] if it doesn't exist.
    async fn read(&self, kind: &str, id: &str) -> DatabankResult<Value>;

    /// Overwrite an existing value.
    ///
    /// Fails with [`DatabankError::NoSuchThing`] if it doesn't exist.
    async fn update(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value>;

    /// Create the value if absent, update it otherwise.
    async fn save(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value>;

    /// Delete a stored value.
    async fn del(&self, kind: &str, id: &str) -> DatabankResult<()>;

    /// Deliver every value of `kind` matching all `criteria` to `on_result`.
    ///
    /// Resolves once the last match has been delivered. Nothing is delivered
    /// when the search fails.
    async fn search(
        &self,
        kind: &str,
        criteria: &Criteria,
        on_result: &mut (dyn FnMut(Value) + Send),
    ) -> DatabankResult<()>;

    /// Read many values of one kind at once.
    ///
    /// Absent ids map to `None`; only a failure of the whole batch is an error.
    async fn read_all(&self, kind: &str, ids: &[&str]) -> DatabankResult<ReadAllResult>;
}
