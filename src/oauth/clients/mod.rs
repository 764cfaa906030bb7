//! Client credential management.
//!
//! Manages registered clients through their lifecycle: creation, patching,
//! expiration and soft deletion.

pub mod lifecycle;

// Re-export main types and services
pub use lifecycle::ClientLifecycleManager;
