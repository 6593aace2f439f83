//! Account passwords hashed with Argon2

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use thiserror::Error;

/// Shortest password accepted at registration or reset
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),
    #[error("Password must be at least {} characters", MIN_PASSWORD_LEN)]
    TooShort,
    #[error("Invalid password hash format")]
    InvalidHash,
}

/// Hashes and checks account passwords
#[derive(Clone)]
pub struct PasswordManager {
    argon2: Argon2<'static>,
}

impl Default for PasswordManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordManager {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Reject passwords below the minimum length
    pub fn check_policy(password: &str) -> Result<(), PasswordError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PasswordError::TooShort);
        }
        Ok(())
    }

    /// Apply the policy, then hash with a fresh salt
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        Self::check_policy(password)?;
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashError(e.to_string()))
    }

    /// Verify a password against a stored PHC string
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let manager = PasswordManager::new();

        let hash = manager.hash_password("analyst-pass").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(manager.verify_password("analyst-pass", &hash).unwrap());
        assert!(!manager.verify_password("wrong-pass", &hash).unwrap());
    }

    #[test]
    fn test_policy() {
        let manager = PasswordManager::new();
        assert!(matches!(
            manager.hash_password("12345"),
            Err(PasswordError::TooShort)
        ));
        assert!(PasswordManager::check_policy("123456").is_ok());
    }

    #[test]
    fn test_malformed_hash() {
        let manager = PasswordManager::new();
        assert!(matches!(
            manager.verify_password("whatever", "plaintext"),
            Err(PasswordError::InvalidHash)
        ));
    }
}
