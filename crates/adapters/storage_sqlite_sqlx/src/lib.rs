//! # upkeep-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using sqlx.
//!
//! ## Responsibilities
//! - Implement the `KeyValueStore` port from `upkeep-app`
//! - Manage the connection pool and run migrations at startup
//! - Map sqlx errors into `UpkeepError::Storage`
//!
//! ## Schema
//! A single `kv_store` table. Every engine-owned collection (rules,
//! templates, recipients, executions, messages) is one row whose value is
//! the collection's JSON document.
//!
//! ## Dependency rule
//! Depends on `upkeep-domain` and `upkeep-app` (for port traits). The rest
//! of the workspace never imports sqlx.

mod error;
mod kv_store;
mod pool;

pub use error::StorageError;
pub use kv_store::SqliteKeyValueStore;
pub use pool::{Config, Database};
