//! In-process CouchDB for testing.
//!
//! [`MemoryCouch`] behaves like a CouchDB server for the calls the adapter
//! makes: revisions and update conflicts, `not_found` for missing databases
//! and documents, `_all_docs` rows for missing keys, and temporary views
//! evaluated through [`ViewQuery::emit`]. Failures can be injected per call
//! kind and every call is counted.

use crate::client::{AllDocsRow, Connector, CouchDatabase, DatabaseInfo, Document, ViewRow};
use crate::config::CouchConfig;
use crate::error::{CouchError, CouchResult};
use crate::view::ViewQuery;
use async_trait::async_trait;
use docbank_storage::values_equal;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// The kinds of call a [`MemoryCouch`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CouchCall {
    Info,
    CreateDatabase,
    DropDatabase,
    Get,
    Save,
    Delete,
    TempView,
    AllDocs,
}

#[derive(Default)]
struct ServerState {
    databases: HashMap<String, BTreeMap<String, Document>>,
    failures: HashMap<CouchCall, VecDeque<CouchError>>,
    calls: HashMap<CouchCall, usize>,
    revision: u64,
}

impl ServerState {
    /// Record a call, returning an injected failure if one is queued.
    fn enter(&mut self, call: CouchCall) -> CouchResult<()> {
        *self.calls.entry(call).or_default() += 1;
        match self.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn database(&mut self, name: &str) -> CouchResult<&mut BTreeMap<String, Document>> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| CouchError::not_found("Database does not exist."))
    }

    fn next_rev(&mut self, current: Option<&str>) -> String {
        let generation = current
            .and_then(|rev| rev.split('-').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        self.revision += 1;
        format!("{}-{:016x}", generation + 1, self.revision)
    }
}

/// An in-memory CouchDB server. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCouch {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryCouch {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server that already has the named database.
    pub fn with_database(name: &str) -> Self {
        let server = Self::new();
        server.lock().databases.insert(name.to_string(), BTreeMap::new());
        server
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `call` fail with `err`. Queued failures fire in order.
    pub fn fail_next(&self, call: CouchCall, err: CouchError) {
        self.lock().failures.entry(call).or_default().push_back(err);
    }

    /// How many times `call` has been served, failures included.
    pub fn calls(&self, call: CouchCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Whether the named database exists.
    pub fn has_database(&self, name: &str) -> bool {
        self.lock().databases.contains_key(name)
    }

    /// The raw stored document, if any.
    pub fn document(&self, database: &str, id: &str) -> Option<Document> {
        self.lock().databases.get(database)?.get(id).cloned()
    }

    /// Store a raw document directly, bypassing revision checks.
    pub fn insert_document(&self, database: &str, mut doc: Document) {
        let mut state = self.lock();
        if doc.rev.is_none() {
            doc.rev = Some(state.next_rev(None));
        }
        state
            .databases
            .entry(database.to_string())
            .or_default()
            .insert(doc.id.clone(), doc);
    }

    /// A handle to the named database; it need not exist yet.
    pub fn database(&self, name: &str) -> MemoryCouchDatabase {
        MemoryCouchDatabase {
            server: self.clone(),
            name: name.to_string(),
        }
    }
}

impl Connector for MemoryCouch {
    fn open(&self, config: &CouchConfig) -> CouchResult<Arc<dyn CouchDatabase>> {
        match config.database.as_deref() {
            Some(name) if !name.is_empty() => Ok(Arc::new(self.database(name))),
            _ => Err(CouchError::invalid_config("no database configured")),
        }
    }
}

/// A handle to one database of a [`MemoryCouch`].
pub struct MemoryCouchDatabase {
    server: MemoryCouch,
    name: String,
}

#[async_trait]
impl CouchDatabase for MemoryCouchDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn info(&self) -> CouchResult<DatabaseInfo> {
        let mut state = self.server.lock();
        state.enter(CouchCall::Info)?;
        let doc_count = state.database(&self.name)?.len() as u64;
        Ok(DatabaseInfo {
            db_name: self.name.clone(),
            doc_count,
            extra: Map::new(),
        })
    }

    async fn create_database(&self) -> CouchResult<()> {
        let mut state = self.server.lock();
        state.enter(CouchCall::CreateDatabase)?;
        if state.databases.contains_key(&self.name) {
            return Err(CouchError::new(
                Some(412),
                "file_exists",
                "The database could not be created, the file already exists.",
            ));
        }
        state.databases.insert(self.name.clone(), BTreeMap::new());
        Ok(())
    }

    async fn drop_database(&self) -> CouchResult<()> {
        let mut state = self.server.lock();
        state.enter(CouchCall::DropDatabase)?;
        state
            .databases
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| CouchError::not_found("Database does not exist."))
    }

    async fn get(&self, id: &str) -> CouchResult<Document> {
        let mut state = self.server.lock();
        state.enter(CouchCall::Get)?;
        state
            .database(&self.name)?
            .get(id)
            .cloned()
            .ok_or_else(|| CouchError::not_found("missing"))
    }

    async fn save(&self, doc: &Document) -> CouchResult<String> {
        let mut state = self.server.lock();
        state.enter(CouchCall::Save)?;
        let current = state
            .database(&self.name)?
            .get(&doc.id)
            .and_then(|stored| stored.rev.clone());

        if current != doc.rev {
            return Err(CouchError::conflict());
        }

        let rev = state.next_rev(current.as_deref());
        let mut stored = doc.clone();
        stored.rev = Some(rev.clone());
        state.database(&self.name)?.insert(doc.id.clone(), stored);
        Ok(rev)
    }

    async fn delete(&self, id: &str, rev: &str) -> CouchResult<()> {
        let mut state = self.server.lock();
        state.enter(CouchCall::Delete)?;
        let database = state.database(&self.name)?;
        let current = database.get(id).map(|stored| stored.rev.clone());
        match current {
            None => Err(CouchError::not_found("missing")),
            Some(stored) if stored.as_deref() != Some(rev) => Err(CouchError::conflict()),
            Some(_) => {
                database.remove(id);
                Ok(())
            }
        }
    }

    async fn temp_view(&self, query: &ViewQuery, key: &Value) -> CouchResult<Vec<ViewRow>> {
        let mut state = self.server.lock();
        state.enter(CouchCall::TempView)?;

        let mut rows = Vec::new();
        for doc in state.database(&self.name)?.values() {
            let raw = serde_json::to_value(doc).map_err(CouchError::invalid_response)?;
            if let Some(emitted) = query.emit(&raw) {
                if values_equal(&emitted, key) {
                    rows.push(ViewRow {
                        id: Some(doc.id.clone()),
                        key: emitted,
                        value: raw,
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn all_docs(&self, keys: &[String]) -> CouchResult<Vec<AllDocsRow>> {
        let mut state = self.server.lock();
        state.enter(CouchCall::AllDocs)?;
        let database = state.database(&self.name)?;

        Ok(keys
            .iter()
            .map(|key| match database.get(key) {
                Some(doc) => AllDocsRow {
                    key: key.clone(),
                    id: Some(doc.id.clone()),
                    value: Some(json!({ "rev": doc.rev })),
                    doc: Some(doc.clone()),
                    error: None,
                },
                None => AllDocsRow {
                    key: key.clone(),
                    id: None,
                    value: None,
                    doc: None,
                    error: Some("not_found".to_string()),
                },
            })
            .collect())
    }
}
