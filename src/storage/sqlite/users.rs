//! SQLite implementation for user account storage

use super::{column, database_error, from_micros, lifecycle_predicate, to_micros};
use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::{Result, UserFilter, UserProjection, UserStore, UserUpdate};
use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use std::collections::BTreeSet;

const USER_COLUMNS: &str = "users.id, users.name, users.email, users.institution, \
    users.occupation, users.username, users.password_hash, users.grants, users.created_at, \
    users.updated_at, users.deleted_at";

/// SQLite implementation of user account storage
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Create a new SQLite user store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append the WHERE clause for `filter`
    fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, filter: &UserFilter) {
        builder.push(" WHERE ");
        builder.push(lifecycle_predicate(filter.lifecycle, "users"));
        if let Some(id) = filter.id {
            builder.push(" AND users.id = ").push_bind(id.to_string());
        }
        if let Some(ref email) = filter.email {
            builder.push(" AND users.email = ").push_bind(email.clone());
        }
    }

    /// Serialize grants to JSON string
    fn serialize_grants(grants: &BTreeSet<String>) -> Result<String> {
        serde_json::to_string(grants).map_err(|e| StorageError::SerializationFailed(e.to_string()))
    }

    /// Deserialize grants from JSON string
    fn deserialize_grants(json: &str) -> Result<BTreeSet<String>> {
        serde_json::from_str(json).map_err(|e| StorageError::SerializationFailed(e.to_string()))
    }

    /// Load the authorized client references of one user, in grant order
    async fn authorized_client_ids(&self, user_id: &str) -> Result<Vec<ClientId>> {
        let rows = sqlx::query(
            "SELECT client_id FROM user_authorized_clients WHERE user_id = ? ORDER BY position",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter()
            .map(|row| {
                let client_id: String = column(row, "client_id")?;
                ClientId::parse(&client_id).ok_or_else(|| {
                    StorageError::InvalidData(format!("Invalid client id: {}", client_id))
                })
            })
            .collect()
    }

    /// Convert SQLite row plus its authorized clients to User
    async fn row_to_user(&self, row: &SqliteRow) -> Result<User> {
        let id: String = column(row, "id")?;
        let clients_authorized = self.authorized_client_ids(&id).await?;
        let id = UserId::parse(&id)
            .ok_or_else(|| StorageError::InvalidData(format!("Invalid user id: {}", id)))?;

        let password_hash: String = column(row, "password_hash")?;
        let grants: String = column(row, "grants")?;
        let deleted_at: Option<i64> = column(row, "deleted_at")?;

        Ok(User {
            id,
            name: column(row, "name")?,
            email: column(row, "email")?,
            institution: column(row, "institution")?,
            occupation: column(row, "occupation")?,
            credential: Credential {
                username: column(row, "username")?,
                password: Some(PasswordHash::new(password_hash)),
                grants: Self::deserialize_grants(&grants)?,
            },
            clients_authorized,
            created_at: from_micros("created_at", column(row, "created_at")?)?,
            updated_at: from_micros("updated_at", column(row, "updated_at")?)?,
            deleted_at: deleted_at
                .map(|micros| from_micros("deleted_at", micros))
                .transpose()?,
        })
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_user(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Option<User>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users", USER_COLUMNS));
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY users.seq LIMIT 1");

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => {
                let user = self.row_to_user(&row).await?;
                Ok(Some(projection.apply(user)))
            }
            None => Ok(None),
        }
    }

    async fn find_users(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Vec<User>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users", USER_COLUMNS));
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY users.seq");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            let user = self.row_to_user(row).await?;
            users.push(projection.apply(user));
        }
        Ok(users)
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let password_hash = user.credential.password.as_ref().ok_or_else(|| {
            StorageError::InvalidData("User credential has no password hash".to_string())
        })?;
        let grants_json = Self::serialize_grants(&user.credential.grants)?;
        let user_id = user.id.to_string();

        let mut tx = self.pool.begin().await.map_err(database_error)?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, institution, occupation, username, password_hash, grants,
                created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.institution)
        .bind(&user.occupation)
        .bind(&user.credential.username)
        .bind(password_hash.as_str())
        .bind(&grants_json)
        .bind(to_micros(user.created_at))
        .bind(to_micros(user.updated_at))
        .bind(user.deleted_at.map(to_micros))
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        for (position, client_id) in user.clients_authorized.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO user_authorized_clients (user_id, client_id, position) \
                 VALUES (?, ?, ?)",
            )
            .bind(&user_id)
            .bind(client_id.to_string())
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn update_user(&self, filter: &UserFilter, update: &UserUpdate) -> Result<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE users SET updated_at = ");
        builder.push_bind(to_micros(update.updated_at));
        if let Some(ref name) = update.name {
            builder.push(", name = ").push_bind(name.clone());
        }
        if let Some(ref institution) = update.institution {
            builder.push(", institution = ").push_bind(institution.clone());
        }
        if let Some(ref occupation) = update.occupation {
            builder.push(", occupation = ").push_bind(occupation.clone());
        }
        if let Some(ref password) = update.password {
            builder
                .push(", password_hash = ")
                .push_bind(password.as_str().to_string());
        }
        if let Some(deleted_at) = update.deleted_at {
            builder.push(", deleted_at = ").push_bind(to_micros(deleted_at));
        }

        // Only the first matching record is updated
        builder.push(" WHERE seq = (SELECT users.seq FROM users");
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY users.seq LIMIT 1) RETURNING id");

        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let row = builder
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(database_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(database_error)?;
            return Ok(false);
        };

        if let Some(client_id) = update.authorize_client {
            let user_id: String = column(&row, "id")?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO user_authorized_clients (user_id, client_id, position)
                SELECT ?, ?, COALESCE(MAX(position) + 1, 0)
                FROM user_authorized_clients WHERE user_id = ?
                "#,
            )
            .bind(&user_id)
            .bind(client_id.to_string())
            .bind(&user_id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::{SqliteCredentialStore, test_pool};
    use chrono::Utc;

    fn user(email: &str) -> User {
        let now = from_micros("now", to_micros(Utc::now())).unwrap();
        User {
            id: UserId::generate(),
            name: "Ana".to_string(),
            email: email.to_string(),
            institution: Some("INPE".to_string()),
            occupation: None,
            credential: Credential {
                username: email.to_string(),
                password: Some(PasswordHash::new("$2b$04$hash".to_string())),
                grants: BTreeSet::from([DEFAULT_USER_GRANT.to_string()]),
            },
            clients_authorized: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    async fn storage() -> SqliteCredentialStore {
        let storage = SqliteCredentialStore::new(test_pool().await);
        storage.migrate().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_user_storage_and_projection() {
        let storage = storage().await;
        let record = user("a@x.com");
        storage.insert_user(&record).await.unwrap();

        let with = storage
            .find_user(&UserFilter::by_email("a@x.com"), UserProjection::WithPassword)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(with, record);

        let without = storage
            .find_users(&UserFilter::active(), UserProjection::WithoutPassword)
            .await
            .unwrap();
        assert_eq!(without.len(), 1);
        assert!(without[0].credential.password.is_none());
    }

    #[tokio::test]
    async fn test_user_update() {
        let storage = storage().await;
        let record = user("a@x.com");
        storage.insert_user(&record).await.unwrap();

        let mut update = UserUpdate::password(
            PasswordHash::new("$2b$04$other".to_string()),
            Utc::now(),
        );
        update.occupation = Some("Researcher".to_string());
        assert!(
            storage
                .update_user(&UserFilter::by_id(record.id), &update)
                .await
                .unwrap()
        );

        let client_id = ClientId::generate();
        let other_id = ClientId::generate();
        for id in [client_id, other_id, client_id] {
            storage
                .update_user(
                    &UserFilter::by_id(record.id),
                    &UserUpdate::authorize(id, Utc::now()),
                )
                .await
                .unwrap();
        }

        let stored = storage
            .find_user(&UserFilter::by_id(record.id), UserProjection::WithPassword)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.occupation.as_deref(), Some("Researcher"));
        assert_eq!(stored.institution.as_deref(), Some("INPE"));
        assert_eq!(
            stored.credential.password.as_ref().map(PasswordHash::as_str),
            Some("$2b$04$other")
        );
        assert_eq!(stored.clients_authorized, vec![client_id, other_id]);

        // Unknown users do not match
        assert!(
            !storage
                .update_user(
                    &UserFilter::by_id(UserId::generate()),
                    &UserUpdate::at(Utc::now())
                )
                .await
                .unwrap()
        );
    }
}
