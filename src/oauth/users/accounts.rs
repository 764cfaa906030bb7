//! User account management.
//!
//! Accounts are created with a hashed credential, patched, soft deleted and
//! rotated through a current-password check. The password hash is projected out
//! of every result unless an internal caller asks for it.

use crate::errors::{StorageError, UserError};
use crate::oauth::context::RequestContext;
use crate::oauth::password::PasswordHasher;
use crate::oauth::types::*;
use crate::oauth::users::authorization::AuthorizationResolver;
use crate::storage::traits::{
    ClientFilter, CredentialStore, UserFilter, UserProjection, UserUpdate,
};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// User Account Manager
pub struct UserAccountManager {
    storage: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    resolver: AuthorizationResolver,
    /// Grants assigned to new accounts
    default_grants: BTreeSet<String>,
}

impl UserAccountManager {
    /// Create a new user account manager
    pub fn new(storage: Arc<dyn CredentialStore>, hasher: PasswordHasher) -> Self {
        Self {
            resolver: AuthorizationResolver::new(storage.clone()),
            storage,
            hasher,
            default_grants: BTreeSet::from([DEFAULT_USER_GRANT.to_string()]),
        }
    }

    /// Replace the grants assigned on creation
    pub fn with_default_grants(mut self, grants: BTreeSet<String>) -> Self {
        self.default_grants = grants;
        self
    }

    /// All active users, never with their password hash
    pub async fn list_active(&self, ctx: &RequestContext) -> Result<Vec<User>, UserError> {
        let users = ctx
            .run(
                self.storage
                    .find_users(&UserFilter::active(), UserProjection::WithoutPassword),
            )
            .await?;
        debug!(count = users.len(), "Listed active users");
        Ok(users)
    }

    /// The active user with the given id
    pub async fn get(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        projection: UserProjection,
    ) -> Result<User, UserError> {
        let id = parse_user_id(user_id)?;
        self.find_active(ctx, id, user_id, projection).await
    }

    /// Register a new account.
    ///
    /// Fails with a conflict when an active user already holds the email. The
    /// returned record carries no password material.
    pub async fn create(&self, ctx: &RequestContext, payload: NewUser) -> Result<User, UserError> {
        payload.validate()?;

        let existing = ctx
            .run(self.storage.find_user(
                &UserFilter::by_email(&payload.email),
                UserProjection::WithoutPassword,
            ))
            .await?;
        if existing.is_some() {
            debug!(email = %payload.email, "Email already registered");
            return Err(UserError::EmailConflict(payload.email));
        }

        let password_hash = self.hasher.hash(&payload.password).await?;

        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            name: payload.name,
            credential: Credential {
                username: payload.email.clone(),
                password: Some(password_hash),
                grants: self.default_grants.clone(),
            },
            email: payload.email,
            institution: payload.institution,
            occupation: payload.occupation,
            clients_authorized: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        ctx.run(self.storage.insert_user(&user)).await?;

        info!(user_id = %user.id, "User created");
        Ok(UserProjection::WithoutPassword.apply(user))
    }

    /// Merge `patch` into an active user; `false` when the write does not land
    pub async fn update(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        patch: UserPatch,
    ) -> Result<bool, UserError> {
        patch.validate()?;
        let id = parse_user_id(user_id)?;
        self.find_active(ctx, id, user_id, UserProjection::WithoutPassword)
            .await?;

        let update = UserUpdate::from_patch(patch, Utc::now());
        let result = ctx
            .run(self.storage.update_user(&UserFilter::by_id(id), &update))
            .await;
        let updated = best_effort(result, &id, "update")?;

        if updated {
            info!(user_id = %id, "User updated");
        }
        Ok(updated)
    }

    /// Soft delete an active user
    pub async fn delete(&self, ctx: &RequestContext, user_id: &str) -> Result<(), UserError> {
        let id = parse_user_id(user_id)?;
        self.find_active(ctx, id, user_id, UserProjection::WithoutPassword)
            .await?;

        let matched = ctx
            .run(
                self.storage
                    .update_user(&UserFilter::by_id(id), &UserUpdate::soft_delete(Utc::now())),
            )
            .await?;
        if !matched {
            return Err(UserError::NotFound(user_id.to_string()));
        }

        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Replace the password after verifying the current one.
    ///
    /// A mismatch is forbidden and leaves the stored hash untouched.
    pub async fn change_password(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        change: PasswordChange,
    ) -> Result<bool, UserError> {
        change.validate()?;
        let id = parse_user_id(user_id)?;

        if !self
            .check_password(ctx, id, user_id, &change.current_password)
            .await?
        {
            warn!(user_id = %id, "Password change rejected");
            return Err(UserError::IncorrectPassword);
        }

        let password_hash = self.hasher.hash(&change.new_password).await?;
        let result = ctx
            .run(self.storage.update_user(
                &UserFilter::by_id(id),
                &UserUpdate::password(password_hash, Utc::now()),
            ))
            .await;
        let changed = best_effort(result, &id, "change_password")?;

        if changed {
            info!(user_id = %id, "Password changed");
        }
        Ok(changed)
    }

    /// Whether `password` verifies against the active user's stored hash
    pub async fn verify_password(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        password: &str,
    ) -> Result<bool, UserError> {
        let id = parse_user_id(user_id)?;
        self.check_password(ctx, id, user_id, password).await
    }

    /// Record that an active user granted access to an active client.
    ///
    /// The client id is appended once; authorizing twice is a no-op that still succeeds.
    pub async fn authorize_client(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        client_id: &str,
    ) -> Result<bool, UserError> {
        let id = parse_user_id(user_id)?;
        let client = ClientId::parse(client_id)
            .ok_or_else(|| UserError::ClientNotFound(client_id.to_string()))?;

        self.find_active(ctx, id, user_id, UserProjection::WithoutPassword)
            .await?;
        ctx.run(self.storage.find_client(&ClientFilter::by_id(client)))
            .await?
            .ok_or_else(|| UserError::ClientNotFound(client_id.to_string()))?;

        let result = ctx
            .run(self.storage.update_user(
                &UserFilter::by_id(id),
                &UserUpdate::authorize(client, Utc::now()),
            ))
            .await;
        let authorized = best_effort(result, &id, "authorize_client")?;

        if authorized {
            info!(user_id = %id, client_id = %client, "Client authorized");
        }
        Ok(authorized)
    }

    /// Currently valid clients the user has authorized
    pub async fn list_authorized_clients(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<Vec<Client>, UserError> {
        self.resolver.resolve(ctx, user_id, Utc::now()).await
    }

    async fn find_active(
        &self,
        ctx: &RequestContext,
        id: UserId,
        user_id: &str,
        projection: UserProjection,
    ) -> Result<User, UserError> {
        ctx.run(self.storage.find_user(&UserFilter::by_id(id), projection))
            .await?
            .ok_or_else(|| UserError::NotFound(user_id.to_string()))
    }

    async fn check_password(
        &self,
        ctx: &RequestContext,
        id: UserId,
        user_id: &str,
        password: &str,
    ) -> Result<bool, UserError> {
        let user = self
            .find_active(ctx, id, user_id, UserProjection::WithPassword)
            .await?;
        let password_hash = user.credential.password.ok_or_else(|| {
            StorageError::InvalidData(format!("User {} has no password hash", id))
        })?;

        Ok(self.hasher.verify(password, &password_hash).await?)
    }
}

fn parse_user_id(user_id: &str) -> Result<UserId, UserError> {
    UserId::parse(user_id).ok_or_else(|| UserError::NotFound(user_id.to_string()))
}

/// Store faults on best-effort writes become `false`; an interrupted request is still an error.
fn best_effort(
    result: Result<bool, StorageError>,
    id: &UserId,
    operation: &'static str,
) -> Result<bool, UserError> {
    match result {
        Ok(matched) => Ok(matched),
        Err(e) if e.is_interrupted() => Err(e.into()),
        Err(e) => {
            warn!(user_id = %id, operation, error = %e, "User write failed");
            Ok(false)
        }
    }
}
