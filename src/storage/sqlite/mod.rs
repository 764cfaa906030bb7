//! SQLite storage implementations
//!
//! This module provides SQLite-based implementations of the credential storage traits.
//! SQLite is suitable for single-instance deployments and development.

mod clients;
mod users;

use crate::errors::StorageError;
use crate::oauth::types::{Client, User};
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Decode, Row, Type};

pub use clients::SqliteClientStore;
pub use users::SqliteUserStore;

/// SQLite credential storage combining the client and user stores
pub struct SqliteCredentialStore {
    pool: SqlitePool,
    client_store: SqliteClientStore,
    user_store: SqliteUserStore,
}

impl SqliteCredentialStore {
    /// Create a new SQLite credential storage instance
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            client_store: SqliteClientStore::new(pool.clone()),
            user_store: SqliteUserStore::new(pool.clone()),
            pool,
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ClientStore for SqliteCredentialStore {
    async fn find_client(&self, filter: &ClientFilter) -> Result<Option<Client>> {
        self.client_store.find_client(filter).await
    }

    async fn find_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>> {
        self.client_store.find_clients(filter).await
    }

    async fn insert_client(&self, client: &Client) -> Result<()> {
        self.client_store.insert_client(client).await
    }

    async fn update_client(&self, filter: &ClientFilter, update: &ClientUpdate) -> Result<bool> {
        self.client_store.update_client(filter, update).await
    }
}

#[async_trait]
impl UserStore for SqliteCredentialStore {
    async fn find_user(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Option<User>> {
        self.user_store.find_user(filter, projection).await
    }

    async fn find_users(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Vec<User>> {
        self.user_store.find_users(filter, projection).await
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        self.user_store.insert_user(user).await
    }

    async fn update_user(&self, filter: &UserFilter, update: &UserUpdate) -> Result<bool> {
        self.user_store.update_user(filter, update).await
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn authorized_clients(&self, query: &AuthorizedClientsQuery) -> Result<Vec<Client>> {
        self.client_store.authorized_clients(query).await
    }
}

/// SQL rendering of [`Lifecycle::admits`] for `table`
pub(crate) fn lifecycle_predicate(lifecycle: Lifecycle, table: &str) -> String {
    match lifecycle {
        Lifecycle::Active => format!("{}.deleted_at IS NULL", table),
        Lifecycle::Any => "1 = 1".to_string(),
    }
}

pub(crate) fn to_micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}

pub(crate) fn from_micros(column: &str, micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        StorageError::InvalidData(format!("Invalid {} timestamp: {}", column, micros))
    })
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get {}: {}", name, e)))
}

pub(crate) fn database_error(e: sqlx::Error) -> StorageError {
    StorageError::DatabaseError(e.to_string())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}
