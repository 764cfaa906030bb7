//! SQLite implementation for client storage

use super::{column, database_error, from_micros, lifecycle_predicate, to_micros};
use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::{
    AuthorizedClientsQuery, ClientFilter, ClientStore, ClientUpdate, Lifecycle, Result,
};
use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};

const CLIENT_COLUMNS: &str = "clients.id, clients.owner_id, clients.client_name, \
    clients.client_uri, clients.redirect_uri, clients.client_secret, clients.created_at, \
    clients.updated_at, clients.expired_at, clients.deleted_at";

/// SQLite implementation of client storage
pub struct SqliteClientStore {
    pool: SqlitePool,
}

impl SqliteClientStore {
    /// Create a new SQLite client store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append the WHERE clause for `filter`
    fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ClientFilter) {
        builder.push(" WHERE ");
        builder.push(lifecycle_predicate(filter.lifecycle, "clients"));
        if let Some(id) = filter.id {
            builder.push(" AND clients.id = ").push_bind(id.to_string());
        }
        if let Some(ref ids) = filter.ids {
            if ids.is_empty() {
                builder.push(" AND 0");
            } else {
                builder.push(" AND clients.id IN (");
                let mut separated = builder.separated(", ");
                for id in ids {
                    separated.push_bind(id.to_string());
                }
                separated.push_unseparated(")");
            }
        }
        if let Some(owner_id) = filter.owner_id {
            builder
                .push(" AND clients.owner_id = ")
                .push_bind(owner_id.to_string());
        }
    }

    /// Convert SQLite row to Client
    fn row_to_client(row: &SqliteRow) -> Result<Client> {
        let id: String = column(row, "id")?;
        let id = ClientId::parse(&id)
            .ok_or_else(|| StorageError::InvalidData(format!("Invalid client id: {}", id)))?;
        let owner_id: String = column(row, "owner_id")?;
        let owner_id = UserId::parse(&owner_id)
            .ok_or_else(|| StorageError::InvalidData(format!("Invalid owner id: {}", owner_id)))?;

        let expired_at: Option<i64> = column(row, "expired_at")?;
        let deleted_at: Option<i64> = column(row, "deleted_at")?;

        Ok(Client {
            id,
            owner_id,
            client_name: column(row, "client_name")?,
            client_uri: column(row, "client_uri")?,
            redirect_uri: column(row, "redirect_uri")?,
            client_secret: column(row, "client_secret")?,
            created_at: from_micros("created_at", column(row, "created_at")?)?,
            updated_at: from_micros("updated_at", column(row, "updated_at")?)?,
            expired_at: expired_at
                .map(|micros| from_micros("expired_at", micros))
                .transpose()?,
            deleted_at: deleted_at
                .map(|micros| from_micros("deleted_at", micros))
                .transpose()?,
        })
    }

    /// Join a user's authorized clients against the client table in one query
    pub async fn authorized_clients(&self, query: &AuthorizedClientsQuery) -> Result<Vec<Client>> {
        let sql = format!(
            "SELECT {columns} FROM users \
             JOIN user_authorized_clients ON user_authorized_clients.user_id = users.id \
             JOIN clients ON clients.id = user_authorized_clients.client_id \
             WHERE users.id = ? AND {active_user} AND {active_client} \
             AND (clients.expired_at IS NULL OR clients.expired_at > ?) \
             ORDER BY user_authorized_clients.position",
            columns = CLIENT_COLUMNS,
            active_user = lifecycle_predicate(Lifecycle::Active, "users"),
            active_client = lifecycle_predicate(Lifecycle::Active, "clients"),
        );

        let rows = sqlx::query(&sql)
            .bind(query.user_id.to_string())
            .bind(to_micros(query.as_of))
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter().map(Self::row_to_client).collect()
    }
}

#[async_trait]
impl ClientStore for SqliteClientStore {
    async fn find_client(&self, filter: &ClientFilter) -> Result<Option<Client>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM clients", CLIENT_COLUMNS));
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY clients.seq LIMIT 1");

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        row.as_ref().map(Self::row_to_client).transpose()
    }

    async fn find_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM clients", CLIENT_COLUMNS));
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY clients.seq");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter().map(Self::row_to_client).collect()
    }

    async fn insert_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (
                id, owner_id, client_name, client_uri, redirect_uri, client_secret,
                created_at, updated_at, expired_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(client.id.to_string())
        .bind(client.owner_id.to_string())
        .bind(&client.client_name)
        .bind(&client.client_uri)
        .bind(&client.redirect_uri)
        .bind(&client.client_secret)
        .bind(to_micros(client.created_at))
        .bind(to_micros(client.updated_at))
        .bind(client.expired_at.map(to_micros))
        .bind(client.deleted_at.map(to_micros))
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }

    async fn update_client(&self, filter: &ClientFilter, update: &ClientUpdate) -> Result<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE clients SET updated_at = ");
        builder.push_bind(to_micros(update.updated_at));
        if let Some(ref client_name) = update.client_name {
            builder.push(", client_name = ").push_bind(client_name.clone());
        }
        if let Some(ref client_uri) = update.client_uri {
            builder.push(", client_uri = ").push_bind(client_uri.clone());
        }
        if let Some(ref redirect_uri) = update.redirect_uri {
            builder.push(", redirect_uri = ").push_bind(redirect_uri.clone());
        }
        if let Some(expired_at) = update.expired_at {
            builder
                .push(", expired_at = ")
                .push_bind(expired_at.map(to_micros));
        }
        if let Some(deleted_at) = update.deleted_at {
            builder.push(", deleted_at = ").push_bind(to_micros(deleted_at));
        }

        // Only the first matching record is updated
        builder.push(" WHERE seq = (SELECT clients.seq FROM clients");
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY clients.seq LIMIT 1)");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() > 0)
    }
}
