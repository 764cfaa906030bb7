//! Client lifecycle management.
//!
//! Creation, patching, expiration and soft deletion of registered clients. Every
//! store round-trip runs under the caller's [`RequestContext`].

use crate::errors::{ClientError, StorageError};
use crate::oauth::context::RequestContext;
use crate::oauth::types::*;
use crate::storage::traits::{ClientFilter, ClientUpdate, CredentialStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client Lifecycle Manager
pub struct ClientLifecycleManager {
    storage: Arc<dyn CredentialStore>,
}

impl ClientLifecycleManager {
    /// Create a new client lifecycle manager
    pub fn new(storage: Arc<dyn CredentialStore>) -> Self {
        Self { storage }
    }

    /// All active clients, in insertion order
    pub async fn list_active(&self, ctx: &RequestContext) -> Result<Vec<Client>, ClientError> {
        let clients = ctx
            .run(self.storage.find_clients(&ClientFilter::active()))
            .await?;
        debug!(count = clients.len(), "Listed active clients");
        Ok(clients)
    }

    /// The active client with the given id
    pub async fn get(&self, ctx: &RequestContext, client_id: &str) -> Result<Client, ClientError> {
        let id = parse_client_id(client_id)?;
        self.find_active(ctx, id, client_id).await
    }

    /// Active clients owned by `owner_id`. A malformed owner id owns nothing.
    pub async fn list_by_owner(
        &self,
        ctx: &RequestContext,
        owner_id: &str,
    ) -> Result<Vec<Client>, ClientError> {
        let Some(owner) = UserId::parse(owner_id) else {
            debug!(owner_id, "Malformed owner id, no clients");
            return Ok(Vec::new());
        };

        let clients = ctx
            .run(
                self.storage
                    .find_clients(&ClientFilter::active().owned_by(owner)),
            )
            .await?;
        debug!(owner_id = %owner, count = clients.len(), "Listed clients by owner");
        Ok(clients)
    }

    /// Register a new client owned by `owner_id`
    pub async fn create(
        &self,
        ctx: &RequestContext,
        owner_id: UserId,
        payload: NewClient,
    ) -> Result<Client, ClientError> {
        payload.validate()?;

        let now = Utc::now();
        let client = Client {
            id: ClientId::generate(),
            owner_id,
            client_name: payload.client_name,
            client_uri: payload.client_uri,
            redirect_uri: payload.redirect_uri,
            client_secret: generate_client_secret(),
            created_at: now,
            updated_at: now,
            expired_at: payload.expired_at,
            deleted_at: None,
        };

        ctx.run(self.storage.insert_client(&client)).await?;

        info!(
            client_id = %client.id,
            owner_id = %client.owner_id,
            expired_at = ?client.expired_at,
            "Client created"
        );
        Ok(client)
    }

    /// Merge `patch` into an active client.
    ///
    /// Returns `false` when the write does not land; the fault is logged, not raised.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        patch: ClientPatch,
    ) -> Result<bool, ClientError> {
        patch.validate()?;
        let id = parse_client_id(client_id)?;
        self.find_active(ctx, id, client_id).await?;

        let update = ClientUpdate::from_patch(patch, Utc::now());
        let result = ctx
            .run(self.storage.update_client(&ClientFilter::by_id(id), &update))
            .await;
        let updated = best_effort(result, &id, "update")?;

        if updated {
            info!(client_id = %id, "Client updated");
        }
        Ok(updated)
    }

    /// Soft delete an active client
    pub async fn delete(&self, ctx: &RequestContext, client_id: &str) -> Result<(), ClientError> {
        let id = parse_client_id(client_id)?;
        self.find_active(ctx, id, client_id).await?;

        let update = ClientUpdate::soft_delete(Utc::now());
        let matched = ctx
            .run(self.storage.update_client(&ClientFilter::by_id(id), &update))
            .await?;

        // Lost a race against a concurrent delete
        if !matched {
            return Err(ClientError::NotFound(client_id.to_string()));
        }

        info!(client_id = %id, "Client deleted");
        Ok(())
    }

    /// Enable or disable an active client by moving its expiration.
    ///
    /// `enable` stores `expired_at` as given, where `None` means the client never
    /// expires. `disable` expires the client now and ignores `expired_at`.
    pub async fn set_expiration(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        action: ExpirationAction,
        expired_at: Option<DateTime<Utc>>,
    ) -> Result<bool, ClientError> {
        let id = parse_client_id(client_id)?;
        self.find_active(ctx, id, client_id).await?;

        let now = Utc::now();
        let expired_at = match action {
            ExpirationAction::Enable => expired_at,
            ExpirationAction::Disable => Some(now),
        };

        let update = ClientUpdate::expiration(expired_at, now);
        let result = ctx
            .run(self.storage.update_client(&ClientFilter::by_id(id), &update))
            .await;
        let updated = best_effort(result, &id, "set_expiration")?;

        if updated {
            info!(client_id = %id, %action, expired_at = ?expired_at, "Client expiration changed");
        }
        Ok(updated)
    }

    /// Status change addressed by an action token and an optional request body
    pub async fn set_status(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        action: &str,
        request: ExpirationRequest,
    ) -> Result<bool, ClientError> {
        let action: ExpirationAction = action.parse()?;
        self.set_expiration(ctx, client_id, action, request.expired_at)
            .await
    }

    async fn find_active(
        &self,
        ctx: &RequestContext,
        id: ClientId,
        client_id: &str,
    ) -> Result<Client, ClientError> {
        ctx.run(self.storage.find_client(&ClientFilter::by_id(id)))
            .await?
            .ok_or_else(|| ClientError::NotFound(client_id.to_string()))
    }
}

fn parse_client_id(client_id: &str) -> Result<ClientId, ClientError> {
    ClientId::parse(client_id).ok_or_else(|| ClientError::NotFound(client_id.to_string()))
}

/// Store faults on best-effort writes become `false`; an interrupted request is still an error.
fn best_effort(
    result: Result<bool, StorageError>,
    id: &ClientId,
    operation: &'static str,
) -> Result<bool, ClientError> {
    match result {
        Ok(matched) => Ok(matched),
        Err(e) if e.is_interrupted() => Err(e.into()),
        Err(e) => {
            warn!(client_id = %id, operation, error = %e, "Client write failed");
            Ok(false)
        }
    }
}
