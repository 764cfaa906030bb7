//! Password hashing and verification backed by bcrypt.

use crate::errors::PasswordError;
use crate::oauth::types::PasswordHash;

/// Lowest cost accepted by bcrypt; used by tests.
pub const MIN_HASH_COST: u32 = 4;

/// Highest cost accepted by bcrypt.
pub const MAX_HASH_COST: u32 = 31;

/// bcrypt only reads this many bytes of input; longer passwords are refused.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Salted password hasher.
///
/// Hashing is CPU bound, so both operations run on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    /// Create a hasher with the given work factor, clamped to the bcrypt range
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_HASH_COST, MAX_HASH_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a cleartext password
    pub async fn hash(&self, password: &str) -> Result<PasswordHash, PasswordError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong(password.len()));
        }
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
            .map(PasswordHash::new)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Verify a cleartext password against a stored hash.
    ///
    /// Input longer than [`MAX_PASSWORD_BYTES`] never verifies.
    pub async fn verify(&self, password: &str, hash: &PasswordHash) -> Result<bool, PasswordError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        let password = password.to_string();
        let hash = hash.as_str().to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
            .map_err(|e| PasswordError::MalformedHash(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_password_hashing() {
        let hasher = PasswordHasher::new(MIN_HASH_COST);
        let hash = hasher.hash("my_secure_password").await.unwrap();

        assert_ne!(hash.as_str(), "my_secure_password");
        assert!(hasher.verify("my_secure_password", &hash).await.unwrap());
        assert!(!hasher.verify("wrong_password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = PasswordHasher::new(MIN_HASH_COST);
        let first = hasher.hash("same").await.unwrap();
        let second = hasher.hash("same").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_hash() {
        let hasher = PasswordHasher::new(MIN_HASH_COST);
        let result = hasher
            .verify("anything", &PasswordHash::new("not-a-hash".to_string()))
            .await;
        assert!(matches!(result, Err(PasswordError::MalformedHash(_))));
    }

    #[tokio::test]
    async fn test_password_length_limit() {
        let hasher = PasswordHasher::new(MIN_HASH_COST);
        let longest = "x".repeat(MAX_PASSWORD_BYTES);
        let hash = hasher.hash(&longest).await.unwrap();
        assert!(hasher.verify(&longest, &hash).await.unwrap());

        // Same first 72 bytes, extra suffix
        let longer = format!("{}OLD", longest);
        assert!(!hasher.verify(&longer, &hash).await.unwrap());
        assert!(matches!(
            hasher.hash(&longer).await,
            Err(PasswordError::TooLong(75))
        ));
    }

    #[test]
    fn test_cost_is_clamped() {
        assert_eq!(PasswordHasher::new(1).cost(), MIN_HASH_COST);
        assert_eq!(PasswordHasher::new(99).cost(), MAX_HASH_COST);
    }
}
