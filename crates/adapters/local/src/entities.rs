//! Snapshot cache — an entity source that learns from emitted events.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use upkeep_app::ports::EntitySource;
use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;

type Key = (String, String);

fn key(entity_type: &str, id: &str) -> Key {
    (entity_type.to_string(), id.to_string())
}

/// Latest known snapshot per `(entity_type, id)`.
///
/// Scheduled and condition-based rules run against whatever the cache
/// holds, so a host that emits an event for every change keeps them
/// current without implementing an entity source of its own.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entities: RwLock<BTreeMap<Key, EntitySnapshot>>,
}

impl SnapshotCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the cache, e.g. from a fixture file.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = EntitySnapshot>) -> Self {
        let entities = entities
            .into_iter()
            .map(|snapshot| (key(&snapshot.entity_type, &snapshot.id), snapshot))
            .collect();
        Self {
            entities: RwLock::new(entities),
        }
    }

    pub async fn get(&self, entity_type: &str, id: &str) -> Option<EntitySnapshot> {
        self.entities.read().await.get(&key(entity_type, id)).cloned()
    }

    pub async fn upsert(&self, snapshot: EntitySnapshot) {
        self.entities
            .write()
            .await
            .insert(key(&snapshot.entity_type, &snapshot.id), snapshot);
    }

    /// Merge `fields` into the entity's data, creating the entity if the
    /// cache has never seen it. Returns the updated snapshot.
    pub async fn merge(&self, entity_type: &str, id: &str, fields: &Map<String, Value>) -> EntitySnapshot {
        let mut entities = self.entities.write().await;
        let snapshot = entities
            .entry(key(entity_type, id))
            .or_insert_with(|| EntitySnapshot::new(id, entity_type, Value::Object(Map::new())));
        if !snapshot.data.is_object() {
            snapshot.data = Value::Object(Map::new());
        }
        if let Value::Object(data) = &mut snapshot.data {
            for (field, value) in fields {
                data.insert(field.clone(), value.clone());
            }
        }
        snapshot.clone()
    }

    pub async fn remove(&self, entity_type: &str, id: &str) -> Option<EntitySnapshot> {
        self.entities.write().await.remove(&key(entity_type, id))
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

impl EntitySource for SnapshotCache {
    async fn list_entities(&self) -> Result<Vec<EntitySnapshot>, UpkeepError> {
        Ok(self.entities.read().await.values().cloned().collect())
    }

    async fn observe(&self, snapshot: EntitySnapshot) {
        tracing::trace!(entity_type = %snapshot.entity_type, entity_id = %snapshot.id, "snapshot cached");
        self.upsert(snapshot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn work_order(id: &str, status: &str) -> EntitySnapshot {
        EntitySnapshot::new(id, "work_order", json!({"status": status}))
    }

    #[tokio::test]
    async fn should_keep_latest_observed_snapshot() {
        let cache = SnapshotCache::new();
        cache.observe(work_order("wo-1", "open")).await;
        cache.observe(work_order("wo-1", "closed")).await;

        let listed = cache.list_entities().await.unwrap();
        assert_eq!(listed, vec![work_order("wo-1", "closed")]);
    }

    #[tokio::test]
    async fn should_key_by_type_and_id() {
        let cache = SnapshotCache::with_entities([
            work_order("1", "open"),
            EntitySnapshot::new("1", "asset", json!({"criticality": "high"})),
        ]);
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("asset", "1").await.unwrap().data["criticality"], "high");
    }

    #[tokio::test]
    async fn should_merge_fields_into_existing_or_new_entity() {
        let cache = SnapshotCache::with_entities([work_order("wo-1", "open")]);
        let mut fields = Map::new();
        fields.insert("status".to_string(), json!("closed"));

        let updated = cache.merge("work_order", "wo-1", &fields).await;
        assert_eq!(updated.data["status"], "closed");

        let created = cache.merge("asset", "a-1", &fields).await;
        assert_eq!(created.data, json!({"status": "closed"}));
        assert_eq!(cache.len().await, 2);

        assert!(cache.remove("asset", "a-1").await.is_some());
        assert!(!cache.is_empty().await);
    }
}
