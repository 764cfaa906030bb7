//! Environment-based configuration types for the account management runtime.

use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::oauth::password::{MAX_HASH_COST, MIN_HASH_COST};
use crate::oauth::types::DEFAULT_USER_GRANT;
use crate::storage::DEFAULT_STORAGE_BACKEND;

/// Default deadline applied to each store request
#[derive(Clone, Debug)]
pub struct StoreTimeout(Duration);

/// bcrypt work factor used for new password hashes
#[derive(Clone, Debug)]
pub struct PasswordHashCost(u32);

/// Grants assigned to newly created users
#[derive(Clone, Debug)]
pub struct DefaultUserGrants(BTreeSet<String>);

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub store_timeout: StoreTimeout,
    pub password_hash_cost: PasswordHashCost,
    pub default_user_grants: DefaultUserGrants,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let storage_backend = default_env("STORAGE_BACKEND", DEFAULT_STORAGE_BACKEND);
        let database_url = optional_env("DATABASE_URL");
        let store_timeout: StoreTimeout = default_env("STORE_TIMEOUT", "5s").try_into()?;
        let password_hash_cost: PasswordHashCost =
            default_env("PASSWORD_HASH_COST", "12").try_into()?;
        let default_user_grants: DefaultUserGrants =
            default_env("DEFAULT_USER_GRANTS", DEFAULT_USER_GRANT).try_into()?;

        Ok(Self {
            version: version()?,
            storage_backend,
            database_url,
            store_timeout,
            password_hash_cost,
            default_user_grants,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

impl TryFrom<String> for StoreTimeout {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
        Ok(Self(duration))
    }
}

impl AsRef<Duration> for StoreTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for PasswordHashCost {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().parse::<u32>() {
            Ok(cost) if (MIN_HASH_COST..=MAX_HASH_COST).contains(&cost) => Ok(Self(cost)),
            _ => Err(ConfigError::HashCostParsingFailed(value).into()),
        }
    }
}

impl AsRef<u32> for PasswordHashCost {
    fn as_ref(&self) -> &u32 {
        &self.0
    }
}

impl TryFrom<String> for DefaultUserGrants {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let grants = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<String>>();

        if grants.is_empty() {
            return Err(ConfigError::EmptyDefaultGrants.into());
        }
        Ok(Self(grants))
    }
}

impl AsRef<BTreeSet<String>> for DefaultUserGrants {
    fn as_ref(&self) -> &BTreeSet<String> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_timeout_parsing() {
        let timeout: StoreTimeout = "5s".to_string().try_into().unwrap();
        assert_eq!(timeout.as_ref(), &Duration::from_secs(5));

        let timeout: StoreTimeout = "2m".to_string().try_into().unwrap();
        assert_eq!(timeout.as_ref(), &Duration::from_secs(120));

        let result: Result<StoreTimeout, _> = "soon".to_string().try_into();
        let error = result.unwrap_err();
        assert!(error.to_string().starts_with("error-accounts-config-2"));
    }

    #[test]
    fn test_password_hash_cost_parsing() {
        let cost: PasswordHashCost = "12".to_string().try_into().unwrap();
        assert_eq!(*cost.as_ref(), 12);

        let cost: PasswordHashCost = " 4 ".to_string().try_into().unwrap();
        assert_eq!(*cost.as_ref(), MIN_HASH_COST);

        for invalid in ["3", "32", "twelve", ""] {
            let result: Result<PasswordHashCost, _> = invalid.to_string().try_into();
            assert!(result.is_err(), "{} should be rejected", invalid);
        }
    }

    #[test]
    fn test_default_user_grants_parsing() {
        let grants: DefaultUserGrants = "user, admin,,user".to_string().try_into().unwrap();
        assert_eq!(
            grants.as_ref(),
            &BTreeSet::from(["admin".to_string(), "user".to_string()])
        );

        let result: Result<DefaultUserGrants, _> = " , ".to_string().try_into();
        assert!(result.is_err());
    }

    #[test]
    fn test_version_is_available() {
        assert!(!version().unwrap().is_empty());
    }
}
