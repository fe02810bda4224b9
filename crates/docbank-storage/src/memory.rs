//! In-memory storage implementation for testing.

use crate::{
    matches, ConnectParams, Criteria, Databank, DatabankError, DatabankResult, ReadAllResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

type Store = BTreeMap<(String, String), Value>;

/// In-memory storage for testing.
///
/// This stores all data in memory and is not persistent. Data survives a
/// disconnect/connect cycle on the same instance.
pub struct MemoryDatabank {
    connected: AtomicBool,
    data: RwLock<Store>,
}

impl MemoryDatabank {
    /// Create a new in-memory storage.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            data: RwLock::new(BTreeMap::new()),
        }
    }

    fn ensure_connected(&self) -> DatabankResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DatabankError::NotConnected)
        }
    }

    fn read_store(&self) -> DatabankResult<RwLockReadGuard<'_, Store>> {
        self.ensure_connected()?;
        self.data
            .read()
            .map_err(|e| DatabankError::backend(format!("Lock poisoned: {e}")))
    }

    fn write_store(&self) -> DatabankResult<RwLockWriteGuard<'_, Store>> {
        self.ensure_connected()?;
        self.data
            .write()
            .map_err(|e| DatabankError::backend(format!("Lock poisoned: {e}")))
    }

    fn key(kind: &str, id: &str) -> (String, String) {
        (kind.to_string(), id.to_string())
    }
}

impl Default for MemoryDatabank {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Databank for MemoryDatabank {
    async fn connect(&self, _params: &ConnectParams) -> DatabankResult<()> {
        self.connected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| DatabankError::AlreadyConnected)
    }

    async fn disconnect(&self) -> DatabankResult<()> {
        self.connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| DatabankError::NotConnected)
    }

    async fn create(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value> {
        let mut data = self.write_store()?;
        let key = Self::key(kind, id);
        if data.contains_key(&key) {
            return Err(DatabankError::already_exists(kind, id));
        }
        debug!(kind, id, "Creating in memory");
        data.insert(key, value.clone());
        Ok(value)
    }

    async fn read(&self, kind: &str, id: &str) -> DatabankResult<Value> {
        let data = self.read_store()?;
        data.get(&Self::key(kind, id))
            .cloned()
            .ok_or_else(|| DatabankError::no_such_thing(kind, id))
    }

    async fn update(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value> {
        let mut data = self.write_store()?;
        match data.get_mut(&Self::key(kind, id)) {
            Some(slot) => {
                *slot = value.clone();
                Ok(value)
            }
            None => Err(DatabankError::no_such_thing(kind, id)),
        }
    }

    async fn save(&self, kind: &str, id: &str, value: Value) -> DatabankResult<Value> {
        let mut data = self.write_store()?;
        data.insert(Self::key(kind, id), value.clone());
        Ok(value)
    }

    async fn del(&self, kind: &str, id: &str) -> DatabankResult<()> {
        let mut data = self.write_store()?;
        data.remove(&Self::key(kind, id))
            .map(|_| ())
            .ok_or_else(|| DatabankError::no_such_thing(kind, id))
    }

    async fn search(
        &self,
        kind: &str,
        criteria: &Criteria,
        on_result: &mut (dyn FnMut(Value) + Send),
    ) -> DatabankResult<()> {
        let hits: Vec<Value> = {
            let data = self.read_store()?;
            data.iter()
                .filter(|((k, _), value)| k == kind && matches(value, criteria))
                .map(|(_, value)| value.clone())
                .collect()
        };

        debug!(kind, hits = hits.len(), "Searched memory");
        for hit in hits {
            on_result(hit);
        }
        Ok(())
    }

    async fn read_all(&self, kind: &str, ids: &[&str]) -> DatabankResult<ReadAllResult> {
        let data = self.read_store()?;
        Ok(ids
            .iter()
            .map(|id| (id.to_string(), data.get(&Self::key(kind, id)).cloned()))
            .collect())
    }
}
