//! Password hashing
//!
//! Argon2 PHC strings. The salt is embedded in the PHC string and is also
//! returned separately so it can be stored in its own column.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use password_hash::rand_core::OsRng;

use super::AuthError;

/// Result of hashing a password
#[derive(Debug, Clone)]
pub struct PasswordDigest {
    pub hash: String,
    pub salt: String,
}

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> Result<PasswordDigest, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .to_string();

    Ok(PasswordDigest {
        hash,
        salt: salt.as_str().to_string(),
    })
}

/// Check a password against a stored PHC string.
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let digest = hash_password("correct horse battery").unwrap();
        assert!(digest.hash.starts_with("$argon2"));
        assert!(digest.hash.contains(&digest.salt));

        assert!(verify_password("correct horse battery", &digest.hash));
        assert!(!verify_password("wrong password", &digest.hash));
    }

    #[test]
    fn test_salts_are_unique() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
