//! The CouchDB [`Databank`].
//!
//! Each `(kind, id)` pair is stored as one CouchDB document whose id is
//! [`document_key`] and whose stored value lives under `data`. Search runs a
//! temporary map query built by [`ViewQuery`]; batch reads use `_all_docs`.

use crate::client::{Connector, CouchDatabase, Document};
use crate::config::CouchConfig;
use crate::http::HttpConnector;
use crate::key::document_key;
use crate::operation::Operation;
use crate::view::ViewQuery;
use async_trait::async_trait;
use docbank_storage::{
    ConnectParams, Criteria, Databank, DatabankError, DatabankResult, ReadAllResult,
};
use docbank_util::TimingGuard;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Set once the test database has been reset in this process.
static TEST_DATABASE_CLEARED: AtomicBool = AtomicBool::new(false);

/// A [`Databank`] backed by one CouchDB database.
pub struct CouchDbDatabank {
    config: CouchConfig,
    connector: Arc<dyn Connector>,
    connection: RwLock<Option<Arc<dyn CouchDatabase>>>,
    reset_flag: &'static AtomicBool,
}

impl CouchDbDatabank {
    /// Create an adapter that talks to CouchDB over HTTP.
    pub fn new(config: CouchConfig) -> Self {
        Self::with_connector(config, Arc::new(HttpConnector))
    }

    /// Create an adapter that opens its database through `connector`.
    pub fn with_connector(config: CouchConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            connection: RwLock::new(None),
            reset_flag: &TEST_DATABASE_CLEARED,
        }
    }

    /// Use `flag` instead of the process-wide one to remember whether the
    /// test database has been reset.
    pub fn with_reset_flag(mut self, flag: &'static AtomicBool) -> Self {
        self.reset_flag = flag;
        self
    }

    pub fn config(&self) -> &CouchConfig {
        &self.config
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn handle(&self) -> DatabankResult<Arc<dyn CouchDatabase>> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(DatabankError::NotConnected)
    }

    /// Drop and recreate the configured database.
    async fn clear_test_database(&self, db: &dyn CouchDatabase) -> DatabankResult<()> {
        let op = Operation::ClearTestDatabase {
            location: &self.config.location,
            database: db.name(),
        };
        info!(database = db.name(), location = %self.config.location, "Resetting test database");

        match db.drop_database().await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(op.translate(err)),
        }
        db.create_database().await.map_err(|e| op.translate(e))
    }

    async fn fetch_document(
        db: &dyn CouchDatabase,
        kind: &str,
        id: &str,
    ) -> DatabankResult<Document> {
        let key = document_key(kind, id);
        match db.get(&key).await {
            Ok(doc) => Ok(doc),
            Err(err) if err.is_not_found() => Err(DatabankError::no_such_thing(kind, id)),
            Err(err) => Err(Operation::ReadDocument { key: &key }.translate(err)),
        }
    }

    /// Store `value` in `doc` and save it, recording the new revision.
    async fn persist_document(
        db: &dyn CouchDatabase,
        kind: &str,
        id: &str,
        doc: &mut Document,
        value: Value,
    ) -> DatabankResult<Value> {
        doc.data = value;
        match db.save(doc).await {
            Ok(rev) => {
                doc.rev = Some(rev);
                Ok(doc.data.clone())
            }
            Err(err) if err.is_conflict() => Err(DatabankError::already_exists(kind, id)),
            Err(err) => Err(Operation::SaveDocument { key: &doc.id }.translate(err)),
        }
    }
}

#[async_trait]
impl Databank for CouchDbDatabank {
    async fn connect(&self, _params: &ConnectParams) -> DatabankResult<()> {
        let _timing = TimingGuard::storage("connect", self.config.database_name());
        let mut slot = self.connection.write().await;
        if slot.is_some() {
            return Err(DatabankError::AlreadyConnected);
        }

        let op = Operation::Connect {
            location: &self.config.location,
            database: self.config.database_name(),
        };
        let db = self.connector.open(&self.config).map_err(|e| op.translate(e))?;

        if self.config.clear_database_for_test_run && !self.reset_flag.swap(true, Ordering::SeqCst)
        {
            self.clear_test_database(db.as_ref()).await?;
        }

        let info = db.info().await.map_err(|e| op.translate(e))?;
        info!(
            database = %info.db_name,
            documents = info.doc_count,
            location = %self.config.location,
            "Connected to CouchDB"
        );

        *slot = Some(db);
        Ok(())
    }

    async fn disconnect(&self) -> DatabankResult<()> {
        match self.connection.write().await.take() {
            Some(db) => {
                info!(database = db.name(), "Disconnected from CouchDB");
                Ok(())
            }
            None => Err(DatabankError::NotConnected),
        }
    }

    async fn create(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value> {
        let _timing = TimingGuard::storage("create", document_key(kind, id));
        let db = self.handle().await?;
        let mut doc = Document::new(document_key(kind, id));
        Self::persist_document(db.as_ref(), kind, id, &mut doc, value).await
    }

    async fn read(&self, kind: &str, id: &str) -> DatabankResult<Value> {
        let _timing = TimingGuard::storage("read", document_key(kind, id));
        let db = self.handle().await?;
        Self::fetch_document(db.as_ref(), kind, id)
            .await
            .map(|doc| doc.data)
            .map_err(|e| Operation::Read { kind, id }.translate(e))
    }

    async fn update(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value> {
        let _timing = TimingGuard::storage("update", document_key(kind, id));
        let db = self.handle().await?;
        let mut doc = Self::fetch_document(db.as_ref(), kind, id).await?;
        Self::persist_document(db.as_ref(), kind, id, &mut doc, value).await
    }

    async fn save(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value> {
        let _timing = TimingGuard::storage("save", document_key(kind, id));
        let db = self.handle().await?;
        let mut doc = match Self::fetch_document(db.as_ref(), kind, id).await {
            Ok(doc) => doc,
            Err(err) if err.is_no_such_thing() => {
                debug!(kind, id, "Saving new document");
                Document::new(document_key(kind, id))
            }
            Err(err) => return Err(err),
        };
        Self::persist_document(db.as_ref(), kind, id, &mut doc, value).await
    }

    async fn del(&self, kind: &str, id: &str) -> DatabankResult<()> {
        let _timing = TimingGuard::storage("delete", document_key(kind, id));
        let db = self.handle().await?;
        let doc = Self::fetch_document(db.as_ref(), kind, id).await?;
        let rev = doc.rev.as_deref().unwrap_or_default();
        db.delete(&doc.id, rev)
            .await
            .map_err(|e| Operation::Delete { kind, id }.translate(e))
    }

    async fn search(
        &self,
        kind: &str,
        criteria: &Criteria,
        on_result: &mut (dyn FnMut(Value) + Send),
    ) -> DatabankResult<()> {
        let _timing = TimingGuard::storage("search", kind.to_string());
        let db = self.handle().await?;

        let query = ViewQuery::new(kind, criteria);
        let key = ViewQuery::key_for(criteria);
        let rows = db
            .temp_view(&query, &key)
            .await
            .map_err(|e| Operation::Search { kind }.translate(e))?;

        debug!(kind, hits = rows.len(), "Searched CouchDB");
        for row in rows {
            on_result(row.into_data());
        }
        Ok(())
    }

    async fn read_all(&self, kind: &str, ids: &[&str]) -> DatabankResult<ReadAllResult> {
        let _timing = TimingGuard::storage("read_all", kind.to_string());
        let db = self.handle().await?;

        let mut result: ReadAllResult = ids.iter().map(|id| (id.to_string(), None)).collect();
        let mut ids_by_key: HashMap<String, &str> = HashMap::with_capacity(ids.len());
        let mut keys = Vec::with_capacity(ids.len());
        for &id in ids {
            let key = document_key(kind, id);
            if ids_by_key.insert(key.clone(), id).is_none() {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(result);
        }

        let rows = db
            .all_docs(&keys)
            .await
            .map_err(|e| Operation::ReadAll { kind }.translate(e))?;

        for row in rows {
            if let (Some(id), Some(doc)) = (ids_by_key.get(&row.key), row.doc) {
                result.insert(id.to_string(), Some(doc.data));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CouchError;
    use crate::memory::{CouchCall, MemoryCouch};
    use serde_json::json;

    fn adapter(server: &MemoryCouch) -> CouchDbDatabank {
        CouchDbDatabank::with_connector(CouchConfig::new("db"), Arc::new(server.clone()))
    }

    #[tokio::test]
    async fn test_connect_checks_database() {
        let server = MemoryCouch::with_database("db");
        let bank = adapter(&server);

        bank.connect(&ConnectParams::new()).await.unwrap();
        assert!(bank.is_connected().await);
        assert_eq!(server.calls(CouchCall::Info), 1);
    }

    #[tokio::test]
    async fn test_connect_to_missing_database_fails_and_stays_disconnected() {
        let server = MemoryCouch::new();
        let bank = adapter(&server);

        let err = bank.connect(&ConnectParams::new()).await.unwrap_err();
        match err {
            DatabankError::ConnectionFailed { message } => assert!(message.starts_with(
                "CouchDB cannot connect to database db at http://localhost:5984: "
            )),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!bank.is_connected().await);
        assert!(matches!(
            bank.read("t", "1").await,
            Err(DatabankError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_twice_fails() {
        let server = MemoryCouch::with_database("db");
        let bank = adapter(&server);
        bank.connect(&ConnectParams::new()).await.unwrap();

        bank.disconnect().await.unwrap();
        assert!(matches!(
            bank.disconnect().await,
            Err(DatabankError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_persist_records_new_revision() {
        let server = MemoryCouch::with_database("db");
        let db = server.database("db");
        let mut doc = Document::new("t:1");

        let value = CouchDbDatabank::persist_document(&db, "t", "1", &mut doc, json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(value, json!({"a": 1}));
        let first = doc.rev.clone().unwrap();

        CouchDbDatabank::persist_document(&db, "t", "1", &mut doc, json!({"a": 2}))
            .await
            .unwrap();
        assert_ne!(doc.rev.as_deref(), Some(first.as_str()));
        assert_eq!(server.document("db", "t:1").unwrap().data, json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_fetch_maps_errors() {
        let server = MemoryCouch::with_database("db");
        let db = server.database("db");

        let err = CouchDbDatabank::fetch_document(&db, "t", "1").await.unwrap_err();
        assert!(err.is_no_such_thing());

        server.fail_next(
            CouchCall::Get,
            CouchError::new(Some(500), "internal", "oops"),
        );
        let err = CouchDbDatabank::fetch_document(&db, "t", "1").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"CouchDB error while reading document t:1: {"status":500,"error":"internal","reason":"oops"}"#
        );
    }

    #[tokio::test]
    async fn test_save_reuses_fetched_document() {
        let server = MemoryCouch::with_database("db");
        let bank = adapter(&server);
        bank.connect(&ConnectParams::new()).await.unwrap();

        bank.create("t", "1", json!(1)).await.unwrap();
        bank.save("t", "1", json!(2)).await.unwrap();

        assert_eq!(server.calls(CouchCall::Get), 1);
        assert_eq!(server.calls(CouchCall::Save), 2);
        assert_eq!(bank.read("t", "1").await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_read_all_without_ids_skips_backend() {
        let server = MemoryCouch::with_database("db");
        let bank = adapter(&server);
        bank.connect(&ConnectParams::new()).await.unwrap();

        assert!(bank.read_all("t", &[]).await.unwrap().is_empty());
        assert_eq!(server.calls(CouchCall::AllDocs), 0);
    }

    #[tokio::test]
    async fn test_read_all_dedupes_keys() {
        let server = MemoryCouch::with_database("db");
        let bank = adapter(&server);
        bank.connect(&ConnectParams::new()).await.unwrap();
        bank.create("t", "1", json!("one")).await.unwrap();

        let result = bank.read_all("t", &["1", "1", "2"]).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result["1"], Some(json!("one")));
        assert_eq!(result["2"], None);
    }
}
