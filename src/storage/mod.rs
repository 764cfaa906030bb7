//! Trait-based credential storage with in-memory and SQLite backends.

pub mod inmemory;
pub mod traits;

// Feature-gated storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export commonly used types and traits
pub use inmemory::MemoryCredentialStore;
#[cfg(test)]
pub use inmemory::FaultyCredentialStore;
pub use traits::*;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCredentialStore;

use crate::errors::StorageError;
use std::sync::Arc;

/// Default SQLite location when `DATABASE_URL` is unset
pub const DEFAULT_SQLITE_URL: &str = "sqlite:accounts.db";

/// Backend used when `STORAGE_BACKEND` is unset; the persistent one when compiled in
#[cfg(feature = "sqlite")]
pub const DEFAULT_STORAGE_BACKEND: &str = "sqlite";
#[cfg(not(feature = "sqlite"))]
pub const DEFAULT_STORAGE_BACKEND: &str = "memory";

/// Storage backend configuration and factory
#[derive(Clone, Debug, PartialEq)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "sqlite")]
    Sqlite(String), // Connection string/path
}

/// Create a storage backend based on configuration
pub async fn create_storage_backend(
    backend: StorageBackend,
) -> std::result::Result<Arc<dyn CredentialStore>, StorageError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryCredentialStore::new())),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite(database_url) => {
            let options = database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()
                .map_err(|e| {
                    StorageError::ConnectionFailed(format!("Invalid SQLite URL: {}", e))
                })?
                .create_if_missing(true);
            let pool = sqlx::SqlitePool::connect_with(options)
                .await
                .map_err(|e| {
                    StorageError::ConnectionFailed(format!("SQLite connection failed: {}", e))
                })?;

            let storage = SqliteCredentialStore::new(pool);

            // Run migrations
            storage.migrate().await?;

            Ok(Arc::new(storage))
        }
    }
}

/// Parse storage backend from configuration string
pub fn parse_storage_backend(
    backend_name: &str,
    database_url: Option<&str>,
) -> std::result::Result<StorageBackend, StorageError> {
    match backend_name {
        "memory" => Ok(StorageBackend::Memory),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let url = database_url.unwrap_or(DEFAULT_SQLITE_URL);
            Ok(StorageBackend::Sqlite(url.to_string()))
        }
        _ => Err(StorageError::InvalidData(format!(
            "Unknown storage backend: {}",
            backend_name
        ))),
    }
}
