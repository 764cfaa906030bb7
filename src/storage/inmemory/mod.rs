//! In-memory storage implementations
//!
//! These implementations are suitable for development and testing.

mod credentials;
#[cfg(test)]
mod faults;

pub use credentials::MemoryCredentialStore;
#[cfg(test)]
pub use faults::FaultyCredentialStore;
