//! Password hashing.

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Port for one-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash `password` into a self-describing string.
    fn hash(&self, password: &str) -> Result<String>;

    /// Whether `password` matches `hash`. A malformed hash never matches.
    fn matches(&self, password: &str, hash: &str) -> bool;
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }
}

impl PasswordHasher for PasswordManager {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    fn matches(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap parameters, tests only.
    pub fn fast_manager() -> PasswordManager {
        PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_argon2() {
        let pwd = fast_manager();

        let hash = pwd.hash("password123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.matches("password123", &hash));
        assert!(!pwd.matches("password124", &hash));
        assert!(!pwd.matches("password123", "not-a-phc-string"));

        // Salted: same input, different output.
        assert_ne!(hash, pwd.hash("password123").unwrap());
    }
}
