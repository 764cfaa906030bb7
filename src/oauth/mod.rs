//! Client credential lifecycle and user account management.

pub mod clients;
pub mod context;
pub mod password;
pub mod types;
pub mod users;

// Re-export frequently used items from each module
pub use crate::storage::traits::{ClientStore, CredentialStore, UserProjection, UserStore};
pub use clients::ClientLifecycleManager;
pub use context::RequestContext;
pub use password::PasswordHasher;
pub use types::{
    Client, ClientId, ClientPatch, Credential, ExpirationAction, ExpirationRequest, NewClient,
    NewUser, PasswordChange, PasswordHash, User, UserId, UserPatch,
};
pub use users::{AuthorizationResolver, UserAccountManager};
