//! Resolution of the clients a user has authorized.

use crate::errors::UserError;
use crate::oauth::context::RequestContext;
use crate::oauth::types::*;
use crate::storage::traits::{AuthorizedClientsQuery, CredentialStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Answers "which currently valid clients has this active user authorized".
///
/// An inactive user, a user without authorizations, or authorizations that only
/// reference expired, deleted or unknown clients all yield an empty list.
#[derive(Clone)]
pub struct AuthorizationResolver {
    storage: Arc<dyn CredentialStore>,
}

impl AuthorizationResolver {
    pub fn new(storage: Arc<dyn CredentialStore>) -> Self {
        Self { storage }
    }

    /// Clients authorized by `user_id` that are valid at `as_of`, in grant order
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Client>, UserError> {
        let Some(id) = UserId::parse(user_id) else {
            debug!(user_id, "Malformed user id, no authorized clients");
            return Ok(Vec::new());
        };

        let query = AuthorizedClientsQuery::new(id, as_of);
        let clients = ctx.run(self.storage.authorized_clients(&query)).await?;

        debug!(user_id = %id, count = clients.len(), "Resolved authorized clients");
        Ok(clients)
    }
}
