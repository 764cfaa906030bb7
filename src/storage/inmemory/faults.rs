//! Fault-injecting store wrapper for exercising store-fault paths in tests.

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Wraps a [`CredentialStore`] and fails reads or writes on demand.
pub struct FaultyCredentialStore {
    inner: Arc<dyn CredentialStore>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Option<Duration>,
}

impl FaultyCredentialStore {
    pub fn new(inner: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            write_delay: None,
        }
    }

    /// Sleep before every write reaches the inner store
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailed(
                "injected read fault".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed(
                "injected write fault".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientStore for FaultyCredentialStore {
    async fn find_client(&self, filter: &ClientFilter) -> Result<Option<Client>> {
        self.check_read()?;
        self.inner.find_client(filter).await
    }

    async fn find_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>> {
        self.check_read()?;
        self.inner.find_clients(filter).await
    }

    async fn insert_client(&self, client: &Client) -> Result<()> {
        self.check_write().await?;
        self.inner.insert_client(client).await
    }

    async fn update_client(&self, filter: &ClientFilter, update: &ClientUpdate) -> Result<bool> {
        self.check_write().await?;
        self.inner.update_client(filter, update).await
    }
}

#[async_trait]
impl UserStore for FaultyCredentialStore {
    async fn find_user(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Option<User>> {
        self.check_read()?;
        self.inner.find_user(filter, projection).await
    }

    async fn find_users(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Vec<User>> {
        self.check_read()?;
        self.inner.find_users(filter, projection).await
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        self.check_write().await?;
        self.inner.insert_user(user).await
    }

    async fn update_user(&self, filter: &UserFilter, update: &UserUpdate) -> Result<bool> {
        self.check_write().await?;
        self.inner.update_user(filter, update).await
    }
}

#[async_trait]
impl CredentialStore for FaultyCredentialStore {
    async fn authorized_clients(&self, query: &AuthorizedClientsQuery) -> Result<Vec<Client>> {
        self.check_read()?;
        self.inner.authorized_clients(query).await
    }
}
