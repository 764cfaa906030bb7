//! OAuth client credentials and user accounts library crate.
//!
//! Provides the client lifecycle and user account managers over a trait-based
//! credential store, with in-memory and SQLite backends.

pub mod config;
pub mod errors;
pub mod oauth;
pub mod storage;
