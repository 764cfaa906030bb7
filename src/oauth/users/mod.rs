//! User accounts and the clients they have authorized.

pub mod accounts;
pub mod authorization;

pub use accounts::UserAccountManager;
pub use authorization::AuthorizationResolver;
