//! In-memory credential storage implementation
//!
//! Records are kept in insertion order so listings match a document store's natural order.

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory implementation for client and user storage
#[derive(Default)]
pub struct MemoryCredentialStore {
    clients: Mutex<Vec<Client>>,
    users: Mutex<Vec<User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::DatabaseError(format!("Lock error: {}", e))
}

#[async_trait]
impl ClientStore for MemoryCredentialStore {
    async fn find_client(&self, filter: &ClientFilter) -> Result<Option<Client>> {
        let clients = self.clients.lock().map_err(lock_error)?;
        Ok(clients.iter().find(|client| filter.matches(client)).cloned())
    }

    async fn find_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>> {
        let clients = self.clients.lock().map_err(lock_error)?;
        Ok(clients
            .iter()
            .filter(|client| filter.matches(client))
            .cloned()
            .collect())
    }

    async fn insert_client(&self, client: &Client) -> Result<()> {
        let mut clients = self.clients.lock().map_err(lock_error)?;
        if clients.iter().any(|existing| existing.id == client.id) {
            return Err(StorageError::QueryFailed(format!(
                "Duplicate client id: {}",
                client.id
            )));
        }
        clients.push(client.clone());
        Ok(())
    }

    async fn update_client(&self, filter: &ClientFilter, update: &ClientUpdate) -> Result<bool> {
        let mut clients = self.clients.lock().map_err(lock_error)?;
        match clients.iter_mut().find(|client| filter.matches(client)) {
            Some(client) => {
                update.apply(client);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl UserStore for MemoryCredentialStore {
    async fn find_user(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Option<User>> {
        let users = self.users.lock().map_err(lock_error)?;
        Ok(users
            .iter()
            .find(|user| filter.matches(user))
            .cloned()
            .map(|user| projection.apply(user)))
    }

    async fn find_users(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Vec<User>> {
        let users = self.users.lock().map_err(lock_error)?;
        Ok(users
            .iter()
            .filter(|user| filter.matches(user))
            .cloned()
            .map(|user| projection.apply(user))
            .collect())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().map_err(lock_error)?;
        if users.iter().any(|existing| existing.id == user.id) {
            return Err(StorageError::QueryFailed(format!(
                "Duplicate user id: {}",
                user.id
            )));
        }
        users.push(user.clone());
        Ok(())
    }

    async fn update_user(&self, filter: &UserFilter, update: &UserUpdate) -> Result<bool> {
        let mut users = self.users.lock().map_err(lock_error)?;
        match users.iter_mut().find(|user| filter.matches(user)) {
            Some(user) => {
                update.apply(user);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn client(owner_id: UserId) -> Client {
        let now = Utc::now();
        Client {
            id: ClientId::generate(),
            owner_id,
            client_name: "Catalog".to_string(),
            client_uri: Some("https://catalog.example.com".to_string()),
            redirect_uri: None,
            client_secret: generate_client_secret(),
            created_at: now,
            updated_at: now,
            expired_at: None,
            deleted_at: None,
        }
    }

    fn user(email: &str, clients_authorized: Vec<ClientId>) -> User {
        let now = Utc::now();
        User {
            id: UserId::generate(),
            name: "Ana".to_string(),
            email: email.to_string(),
            institution: None,
            occupation: None,
            credential: Credential {
                username: email.to_string(),
                password: Some(PasswordHash::new("$2b$04$hash".to_string())),
                grants: BTreeSet::from([DEFAULT_USER_GRANT.to_string()]),
            },
            clients_authorized,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_client_storage() {
        let storage = MemoryCredentialStore::new();
        let owner_id = UserId::generate();
        let first = client(owner_id);
        let second = client(UserId::generate());

        storage.insert_client(&first).await.unwrap();
        storage.insert_client(&second).await.unwrap();

        let retrieved = storage
            .find_client(&ClientFilter::by_id(first.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, first);

        let owned = storage
            .find_clients(&ClientFilter::active().owned_by(owner_id))
            .await
            .unwrap();
        assert_eq!(owned, vec![first.clone()]);

        // Insertion order
        let all = storage.find_clients(&ClientFilter::active()).await.unwrap();
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        // Duplicate ids are rejected
        assert!(storage.insert_client(&first).await.is_err());
    }

    #[tokio::test]
    async fn test_soft_deleted_clients_are_filtered() {
        let storage = MemoryCredentialStore::new();
        let record = client(UserId::generate());
        storage.insert_client(&record).await.unwrap();

        let matched = storage
            .update_client(
                &ClientFilter::by_id(record.id),
                &ClientUpdate::soft_delete(Utc::now()),
            )
            .await
            .unwrap();
        assert!(matched);

        assert!(storage
            .find_client(&ClientFilter::by_id(record.id))
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .find_client(&ClientFilter::by_id(record.id).including_deleted())
            .await
            .unwrap()
            .is_some());

        // A second soft delete no longer matches
        let matched = storage
            .update_client(
                &ClientFilter::by_id(record.id),
                &ClientUpdate::soft_delete(Utc::now()),
            )
            .await
            .unwrap();
        assert!(!matched);
    }

    #[tokio::test]
    async fn test_user_projection() {
        let storage = MemoryCredentialStore::new();
        let record = user("a@x.com", Vec::new());
        storage.insert_user(&record).await.unwrap();

        let without = storage
            .find_user(&UserFilter::by_id(record.id), UserProjection::WithoutPassword)
            .await
            .unwrap()
            .unwrap();
        assert!(without.credential.password.is_none());

        let with = storage
            .find_user(&UserFilter::by_id(record.id), UserProjection::WithPassword)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(with.credential.password, record.credential.password);

        let listed = storage
            .find_users(&UserFilter::active(), UserProjection::WithoutPassword)
            .await
            .unwrap();
        assert!(listed.iter().all(|u| u.credential.password.is_none()));
    }

    #[tokio::test]
    async fn test_authorize_client_appends_once() {
        let storage = MemoryCredentialStore::new();
        let record = user("a@x.com", Vec::new());
        storage.insert_user(&record).await.unwrap();
        let client_id = ClientId::generate();

        for _ in 0..2 {
            storage
                .update_user(
                    &UserFilter::by_id(record.id),
                    &UserUpdate::authorize(client_id, Utc::now()),
                )
                .await
                .unwrap();
        }

        let stored = storage
            .find_user(&UserFilter::by_id(record.id), UserProjection::WithoutPassword)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.clients_authorized, vec![client_id]);
    }

    #[tokio::test]
    async fn test_authorized_clients_join() {
        let storage = MemoryCredentialStore::new();
        let now = Utc::now();

        let valid = client(UserId::generate());
        let mut expired = client(UserId::generate());
        expired.expired_at = Some(now - Duration::minutes(1));
        let mut deleted = client(UserId::generate());
        deleted.deleted_at = Some(now);
        let mut later = client(UserId::generate());
        later.expired_at = Some(now + Duration::days(1));
        let dangling = ClientId::generate();

        for record in [&valid, &expired, &deleted, &later] {
            storage.insert_client(record).await.unwrap();
        }

        let owner = user(
            "a@x.com",
            vec![later.id, expired.id, dangling, deleted.id, valid.id],
        );
        storage.insert_user(&owner).await.unwrap();

        let resolved = storage
            .authorized_clients(&AuthorizedClientsQuery::new(owner.id, now))
            .await
            .unwrap();
        assert_eq!(
            resolved.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![later.id, valid.id]
        );

        // Unknown users resolve to nothing
        let resolved = storage
            .authorized_clients(&AuthorizedClientsQuery::new(UserId::generate(), now))
            .await
            .unwrap();
        assert!(resolved.is_empty());
    }
}
