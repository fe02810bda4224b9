//! Typed helpers over any [`Databank`].

use crate::{Criteria, Databank, DatabankResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// Serde-typed variants of the [`Databank`] operations.
///
/// Implemented for every backend, including `dyn Databank`. Values that fail
/// to convert surface as [`crate::DatabankError::Serialization`].
#[async_trait]
pub trait DatabankExt: Databank {
    async fn create_as<T>(&self, kind: &str, id: &str, value: &T) -> DatabankResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync;

    async fn read_as<T>(&self, kind: &str, id: &str) -> DatabankResult<T>
    where
        T: DeserializeOwned + Send;

    async fn update_as<T>(&self, kind: &str, id: &str, value: &T) -> DatabankResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync;

    async fn save_as<T>(&self, kind: &str, id: &str, value: &T) -> DatabankResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync;

    /// Collect every search hit, in delivery order.
    async fn search_as<T>(&self, kind: &str, criteria: &Criteria) -> DatabankResult<Vec<T>>
    where
        T: DeserializeOwned + Send;

    async fn read_all_as<T>(
        &self,
        kind: &str,
        ids: &[&str],
    ) -> DatabankResult<BTreeMap<String, Option<T>>>
    where
        T: DeserializeOwned + Send;
}

#[async_trait]
impl<D: Databank + ?Sized> DatabankExt for D {
    async fn create_as<T>(&self, kind: &str, id: &str, value: &T) -> DatabankResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let stored = self.create(kind, id, serde_json::to_value(value)?).await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn read_as<T>(&self, kind: &str, id: &str) -> DatabankResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let stored = self.read(kind, id).await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn update_as<T>(&self, kind: &str, id: &str, value: &T) -> DatabankResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let stored = self.update(kind, id, serde_json::to_value(value)?).await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn save_as<T>(&self, kind: &str, id: &str, value: &T) -> DatabankResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let stored = self.save(kind, id, serde_json::to_value(value)?).await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn search_as<T>(&self, kind: &str, criteria: &Criteria) -> DatabankResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut hits = Vec::new();
        self.search(kind, criteria, &mut |value: serde_json::Value| hits.push(value))
            .await?;

        let typed = hits
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(typed)
    }

    async fn read_all_as<T>(
        &self,
        kind: &str,
        ids: &[&str],
    ) -> DatabankResult<BTreeMap<String, Option<T>>>
    where
        T: DeserializeOwned + Send,
    {
        let mut typed = BTreeMap::new();
        for (id, value) in self.read_all(kind, ids).await? {
            let value = value.map(serde_json::from_value).transpose()?;
            typed.insert(id, value);
        }
        Ok(typed)
    }
}
