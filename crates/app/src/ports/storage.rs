//! Storage port — whole-collection key/value persistence.
//!
//! Every engine-owned collection (rules, templates, recipients, executions,
//! messages) is stored as one JSON document under a fixed key. Writes replace
//! the whole document, so the last writer wins per collection.

use std::future::Future;

use upkeep_domain::error::UpkeepError;

/// A durable map from collection key to JSON text.
pub trait KeyValueStore {
    /// Read the document stored under `key`, or `None` if it was never
    /// written.
    fn load(&self, key: &str) -> impl Future<Output = Result<Option<String>, UpkeepError>> + Send;

    /// Replace the document stored under `key`.
    fn save(&self, key: &str, value: String) -> impl Future<Output = Result<(), UpkeepError>> + Send;
}

impl<T: KeyValueStore + Send + Sync> KeyValueStore for std::sync::Arc<T> {
    fn load(&self, key: &str) -> impl Future<Output = Result<Option<String>, UpkeepError>> + Send {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: String) -> impl Future<Output = Result<(), UpkeepError>> + Send {
        (**self).save(key, value)
    }
}
