//! Argon2 password hashing for ledger accounts.

use anyhow::{anyhow, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Argon2 password hashing
pub struct PasswordHasher;

impl PasswordHasher {
    /// Hash password using Argon2, returning the PHC string.
    pub fn hash_password(password: &[u8]) -> Result<String> {
        use argon2::password_hash::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password, &salt)
            .map_err(|_| anyhow!("Password hashing failed"))?;

        Ok(password_hash.to_string())
    }

    /// Verify password against hash
    pub fn verify_password(password: &[u8], hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| anyhow!("Invalid hash format"))?;

        Ok(Argon2::default()
            .verify_password(password, &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = PasswordHasher::hash_password(b"senha123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(PasswordHasher::verify_password(b"senha123", &hash).unwrap());
        assert!(!PasswordHasher::verify_password(b"wrong", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = PasswordHasher::hash_password(b"same").unwrap();
        let b = PasswordHasher::hash_password(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_hash_is_error() {
        assert!(PasswordHasher::verify_password(b"x", "not-a-phc-string").is_err());
    }
}
