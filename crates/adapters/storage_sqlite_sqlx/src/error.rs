use upkeep_domain::error::UpkeepError;

/// Errors raised by the `SQLite` adapter.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for UpkeepError {
    fn from(err: StorageError) -> Self {
        UpkeepError::Storage(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_wrap_database_error_as_storage() {
        let err: UpkeepError = StorageError::from(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, UpkeepError::Storage(_)));
        assert_eq!(err.to_string(), "storage error");
    }
}
