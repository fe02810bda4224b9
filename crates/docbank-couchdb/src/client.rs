//! The slice of CouchDB's document API the adapter relies on.
//!
//! [`CouchDatabase`] is a handle to one database on one server. A
//! [`Connector`] opens handles from configuration; the HTTP implementation
//! lives in [`crate::http`] and an in-process one in [`crate::memory`].

use crate::config::CouchConfig;
use crate::error::CouchResult;
use crate::view::ViewQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A CouchDB document as the adapter stores it.
///
/// The stored value lives under `data`. Fields the adapter doesn't know about
/// are kept in `extra` so they survive a read-modify-write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(default)]
    pub data: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// A document that has never been saved.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            data: Value::Null,
            extra: Map::new(),
        }
    }
}

/// Response to a database info request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,

    #[serde(default)]
    pub doc_count: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One row of a map query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default)]
    pub id: Option<String>,
    pub key: Value,
    /// The emitted value; the adapter emits the whole document.
    pub value: Value,
}

impl ViewRow {
    /// The stored value inside the emitted document.
    pub fn into_data(self) -> Value {
        match self.value {
            Value::Object(mut doc) => doc.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// One row of an `_all_docs` lookup by key.
///
/// Missing documents come back with `error` set; deleted ones with `doc`
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllDocsRow {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A handle to one CouchDB database.
#[async_trait]
pub trait CouchDatabase: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Fetch database metadata; doubles as a connectivity check.
    async fn info(&self) -> CouchResult<DatabaseInfo>;

    async fn create_database(&self) -> CouchResult<()>;

    async fn drop_database(&self) -> CouchResult<()>;

    async fn get(&self, id: &str) -> CouchResult<Document>;

    /// Save a document and return its new revision.
    ///
    /// Saving a document whose revision doesn't match the stored one fails
    /// with a `conflict` error.
    async fn save(&self, doc: &Document) -> CouchResult<String>;

    async fn delete(&self, id: &str, rev: &str) -> CouchResult<()>;

    /// Run a temporary map query and return the rows whose key equals `key`.
    async fn temp_view(&self, query: &ViewQuery, key: &Value) -> CouchResult<Vec<ViewRow>>;

    /// Look up many documents by id, one row per requested key.
    async fn all_docs(&self, keys: &[String]) -> CouchResult<Vec<AllDocsRow>>;
}

/// Opens database handles from configuration.
pub trait Connector: Send + Sync {
    fn open(&self, config: &CouchConfig) -> CouchResult<Arc<dyn CouchDatabase>>;
}
