//! Local credential hashing with Argon2id.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("hashing failed: {0}")]
    HashingFailed(String),
}

/// Length of the throwaway password generated for externally-authenticated
/// users.
const PLACEHOLDER_LEN: usize = 32;

/// Argon2id hasher.
///
/// Defaults follow the OWASP recommendation (19 MiB, 2 iterations, 1 lane).
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::new(19_456, 2, 1, None).unwrap_or_default(),
        }
    }
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters (tests use cheap ones).
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Constant-time check of `password` against a stored PHC string.
    ///
    /// An unparseable stored hash is a mismatch, never an error.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2().verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Hash of a random password nobody knows.
    ///
    /// Stored for users authenticated by the directory or the identity
    /// provider; it exists only so the credential column is never empty.
    pub fn placeholder_hash(&self) -> Result<String, PasswordError> {
        let throwaway: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(PLACEHOLDER_LEN)
            .map(char::from)
            .collect();
        self.hash(&throwaway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hasher = cheap();
        let hash = hasher.hash("s3cret!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("s3cret!", &hash));
        assert!(!hasher.verify("S3cret!", &hash));
    }

    #[test]
    fn salts_differ() {
        let hasher = cheap();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn corrupt_hash_is_a_mismatch() {
        assert!(!cheap().verify("anything", "not-a-phc-string"));
        assert!(!cheap().verify("", ""));
    }

    #[test]
    fn placeholder_does_not_match_empty_or_common_passwords() {
        let hasher = cheap();
        let hash = hasher.placeholder_hash().unwrap();
        assert!(!hasher.verify("", &hash));
        assert!(!hasher.verify("password", &hash));
    }

    #[test]
    fn zero_memory_is_rejected() {
        assert!(PasswordHasher::with_params(0, 1, 1).is_err());
    }
}
