//! Storage trait definitions for clients and user accounts.
//!
//! Defines the typed filters, projections and partial updates accepted by the
//! async storage interfaces, and the authorized-clients query.

use crate::errors::StorageError;
use crate::oauth::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub type Result<T> = std::result::Result<T, StorageError>;

// ===== Filters =====

/// Soft-delete visibility of a filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    /// Only records without `deleted_at`
    #[default]
    Active,
    /// Every record, deleted or not
    Any,
}

impl Lifecycle {
    /// The active-record predicate. Every backend filters soft-deleted records through this rule.
    pub fn admits(&self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            Lifecycle::Active => deleted_at.is_none(),
            Lifecycle::Any => true,
        }
    }
}

/// Client selection criteria; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientFilter {
    pub id: Option<ClientId>,
    pub ids: Option<Vec<ClientId>>,
    pub owner_id: Option<UserId>,
    pub lifecycle: Lifecycle,
}

impl ClientFilter {
    /// All active clients
    pub fn active() -> Self {
        Self::default()
    }

    /// The active client with the given id
    pub fn by_id(id: ClientId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Active clients whose id is one of `ids`
    pub fn any_of(ids: Vec<ClientId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.lifecycle = Lifecycle::Any;
        self
    }

    pub fn matches(&self, client: &Client) -> bool {
        self.lifecycle.admits(client.deleted_at)
            && self.id.is_none_or(|id| id == client.id)
            && self
                .ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&client.id))
            && self.owner_id.is_none_or(|owner_id| owner_id == client.owner_id)
    }
}

/// User selection criteria; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub id: Option<UserId>,
    pub email: Option<String>,
    pub lifecycle: Lifecycle,
}

impl UserFilter {
    /// All active users
    pub fn active() -> Self {
        Self::default()
    }

    /// The active user with the given id
    pub fn by_id(id: UserId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// The active user holding `email`
    pub fn by_email(email: &str) -> Self {
        Self {
            email: Some(email.to_string()),
            ..Self::default()
        }
    }

    pub fn including_deleted(mut self) -> Self {
        self.lifecycle = Lifecycle::Any;
        self
    }

    pub fn matches(&self, user: &User) -> bool {
        self.lifecycle.admits(user.deleted_at)
            && self.id.is_none_or(|id| id == user.id)
            && self.email.as_ref().is_none_or(|email| *email == user.email)
    }
}

/// Whether the password hash is returned with a user record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserProjection {
    #[default]
    WithoutPassword,
    WithPassword,
}

impl UserProjection {
    pub fn apply(&self, mut user: User) -> User {
        if *self == UserProjection::WithoutPassword {
            user.credential.password = None;
        }
        user
    }
}

// ===== Partial updates =====

/// Fields to overwrite on a stored client. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientUpdate {
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub redirect_uri: Option<String>,
    /// `Some(None)` clears the expiration
    pub expired_at: Option<Option<DateTime<Utc>>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ClientUpdate {
    /// An update that only stamps `updated_at`
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            client_name: None,
            client_uri: None,
            redirect_uri: None,
            expired_at: None,
            deleted_at: None,
            updated_at: now,
        }
    }

    pub fn from_patch(patch: ClientPatch, now: DateTime<Utc>) -> Self {
        Self {
            client_name: patch.client_name,
            client_uri: patch.client_uri,
            redirect_uri: patch.redirect_uri,
            expired_at: patch.expired_at.map(Some),
            ..Self::at(now)
        }
    }

    pub fn expiration(expired_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            expired_at: Some(expired_at),
            ..Self::at(now)
        }
    }

    pub fn soft_delete(now: DateTime<Utc>) -> Self {
        Self {
            deleted_at: Some(now),
            ..Self::at(now)
        }
    }

    pub fn apply(&self, client: &mut Client) {
        if let Some(ref client_name) = self.client_name {
            client.client_name = client_name.clone();
        }
        if let Some(ref client_uri) = self.client_uri {
            client.client_uri = Some(client_uri.clone());
        }
        if let Some(ref redirect_uri) = self.redirect_uri {
            client.redirect_uri = Some(redirect_uri.clone());
        }
        if let Some(expired_at) = self.expired_at {
            client.expired_at = expired_at;
        }
        if let Some(deleted_at) = self.deleted_at {
            client.deleted_at = Some(deleted_at);
        }
        client.updated_at = self.updated_at;
    }
}

/// Fields to overwrite on a stored user. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub institution: Option<String>,
    pub occupation: Option<String>,
    pub password: Option<PasswordHash>,
    /// Appended to `clients_authorized` unless already present
    pub authorize_client: Option<ClientId>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserUpdate {
    /// An update that only stamps `updated_at`
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            name: None,
            institution: None,
            occupation: None,
            password: None,
            authorize_client: None,
            deleted_at: None,
            updated_at: now,
        }
    }

    pub fn from_patch(patch: UserPatch, now: DateTime<Utc>) -> Self {
        Self {
            name: patch.name,
            institution: patch.institution,
            occupation: patch.occupation,
            ..Self::at(now)
        }
    }

    pub fn password(password: PasswordHash, now: DateTime<Utc>) -> Self {
        Self {
            password: Some(password),
            ..Self::at(now)
        }
    }

    pub fn authorize(client_id: ClientId, now: DateTime<Utc>) -> Self {
        Self {
            authorize_client: Some(client_id),
            ..Self::at(now)
        }
    }

    pub fn soft_delete(now: DateTime<Utc>) -> Self {
        Self {
            deleted_at: Some(now),
            ..Self::at(now)
        }
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(ref name) = self.name {
            user.name = name.clone();
        }
        if let Some(ref institution) = self.institution {
            user.institution = Some(institution.clone());
        }
        if let Some(ref occupation) = self.occupation {
            user.occupation = Some(occupation.clone());
        }
        if let Some(ref password) = self.password {
            user.credential.password = Some(password.clone());
        }
        if let Some(client_id) = self.authorize_client {
            if !user.has_authorized(&client_id) {
                user.clients_authorized.push(client_id);
            }
        }
        if let Some(deleted_at) = self.deleted_at {
            user.deleted_at = Some(deleted_at);
        }
        user.updated_at = self.updated_at;
    }
}

// ===== Authorized clients =====

/// The clients a user has authorized that are usable at `as_of`.
///
/// Stages: expand the user's `clients_authorized`, join each reference against the
/// client records, keep only an active user and clients that are active and valid at
/// `as_of`, then project the client records. Dangling references produce nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedClientsQuery {
    pub user_id: UserId,
    pub as_of: DateTime<Utc>,
}

impl AuthorizedClientsQuery {
    pub fn new(user_id: UserId, as_of: DateTime<Utc>) -> Self {
        Self { user_id, as_of }
    }

    /// Filter applied to every joined client
    pub fn admits(&self, client: &Client) -> bool {
        Lifecycle::Active.admits(client.deleted_at) && client.is_valid_at(self.as_of)
    }
}

// ===== Store traits =====

/// Trait for storing and retrieving clients
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// First client matching the filter
    async fn find_client(&self, filter: &ClientFilter) -> Result<Option<Client>>;

    /// All clients matching the filter, in insertion order
    async fn find_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>>;

    /// Store a new client
    async fn insert_client(&self, client: &Client) -> Result<()>;

    /// Apply `update` to the first client matching the filter; returns whether one matched
    async fn update_client(&self, filter: &ClientFilter, update: &ClientUpdate) -> Result<bool>;
}

/// Trait for storing and retrieving user accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// First user matching the filter
    async fn find_user(
        &self,
        filter: &UserFilter,
        projection: UserProjection,
    ) -> Result<Option<User>>;

    /// All users matching the filter, in insertion order
    async fn find_users(&self, filter: &UserFilter, projection: UserProjection)
    -> Result<Vec<User>>;

    /// Store a new user
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Apply `update` to the first user matching the filter; returns whether one matched
    async fn update_user(&self, filter: &UserFilter, update: &UserUpdate) -> Result<bool>;
}

/// Combined credential storage trait
#[async_trait]
pub trait CredentialStore: ClientStore + UserStore + Send + Sync {
    /// Resolve the authorized clients of one user.
    ///
    /// The provided implementation performs the join in process with two store calls.
    /// Backends with server-side joins override it.
    async fn authorized_clients(&self, query: &AuthorizedClientsQuery) -> Result<Vec<Client>> {
        let user = self
            .find_user(
                &UserFilter::by_id(query.user_id),
                UserProjection::WithoutPassword,
            )
            .await?;

        let Some(user) = user else {
            return Ok(Vec::new());
        };
        if user.clients_authorized.is_empty() {
            return Ok(Vec::new());
        }

        let referenced = self
            .find_clients(&ClientFilter::any_of(user.clients_authorized.clone()))
            .await?;
        let referenced: HashMap<ClientId, Client> = referenced
            .into_iter()
            .map(|client| (client.id, client))
            .collect();

        let mut seen = HashSet::new();
        Ok(user
            .clients_authorized
            .iter()
            .filter(|client_id| seen.insert(**client_id))
            .filter_map(|client_id| referenced.get(client_id))
            .filter(|client| query.admits(client))
            .cloned()
            .collect())
    }
}
