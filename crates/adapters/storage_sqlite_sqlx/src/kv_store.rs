use sqlx::SqlitePool;

use upkeep_app::ports::KeyValueStore;
use upkeep_domain::error::UpkeepError;
use upkeep_domain::time;

use crate::error::StorageError;

const SELECT_BY_KEY: &str = "SELECT value FROM kv_store WHERE key = ?";

const UPSERT: &str = r"
    INSERT INTO kv_store (key, value, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

/// `SQLite`-backed key/value store.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Create a store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    async fn load(&self, key: &str) -> Result<Option<String>, UpkeepError> {
        let row: Option<(String,)> = sqlx::query_as(SELECT_BY_KEY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|(value,)| value))
    }

    async fn save(&self, key: &str, value: String) -> Result<(), UpkeepError> {
        let bytes = value.len();
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(time::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        tracing::trace!(key, bytes, "collection saved");
        Ok(())
    }
}
