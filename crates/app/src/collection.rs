//! A persisted in-memory collection.
//!
//! Each collection is loaded once from its [`KeyValueStore`] key and then
//! served from memory. Every mutation rewrites the whole document while the
//! write lock is held, so writes to one collection are serialized.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use upkeep_domain::error::UpkeepError;

use crate::ports::KeyValueStore;

pub struct Collection<S, T> {
    store: Arc<S>,
    key: &'static str,
    items: RwLock<Vec<T>>,
}

impl<S, T> Collection<S, T>
where
    S: KeyValueStore + Send + Sync,
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    #[must_use]
    pub fn new(store: Arc<S>, key: &'static str) -> Self {
        Self {
            store,
            key,
            items: RwLock::new(Vec::new()),
        }
    }

    /// Replace the in-memory items with the stored document.
    ///
    /// A missing key loads as an empty collection. The in-memory items are
    /// left as they were when the document cannot be read or parsed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read or the stored
    /// document does not parse.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        let loaded = match self.store.load(self.key).await? {
            None => Vec::new(),
            Some(json) => serde_json::from_str::<Vec<T>>(&json).map_err(|err| {
                tracing::error!(key = self.key, error = %err, "stored collection does not parse");
                UpkeepError::Storage(Box::new(err))
            })?,
        };
        let count = loaded.len();
        *self.items.write().await = loaded;
        tracing::debug!(key = self.key, count, "collection loaded");
        Ok(count)
    }

    pub async fn all(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.items.read().await.iter().find(|item| predicate(item)).cloned()
    }

    pub async fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.items
            .read()
            .await
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// Apply `change` to the items and persist the result.
    ///
    /// When `change` returns an error nothing is written and the in-memory
    /// items are left as they were.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `change`, or a storage error if the
    /// collection cannot be serialized or saved.
    pub async fn mutate<R>(
        &self,
        change: impl FnOnce(&mut Vec<T>) -> Result<R, UpkeepError>,
    ) -> Result<R, UpkeepError> {
        let mut items = self.items.write().await;
        let mut next = items.clone();
        let output = change(&mut next)?;
        let json = serde_json::to_string(&next).map_err(|err| UpkeepError::Storage(Box::new(err)))?;
        self.store.save(self.key, json).await?;
        *items = next;
        Ok(output)
    }
}
