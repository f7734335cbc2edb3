//! Password hashing with Argon2id.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use parceltrace_types::{CustodyError, Result};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Argon2id password hashing and verification.
#[derive(Clone, Default)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject weak passwords before hashing.
    pub fn check_strength(&self, password: &str) -> Result<()> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(CustodyError::invalid_argument(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }
        Ok(())
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CustodyError::internal(format!("password hash: {}", e)))
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CustodyError::internal(format!("stored hash is malformed: {}", e)))?;
        Ok(self.argon2.verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let passwords = PasswordService::new();
        let hash = passwords.hash("correct horse battery staple").unwrap();
        assert!(passwords.verify("correct horse battery staple", &hash).unwrap());
        assert!(!passwords.verify("wrong password entirely", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let passwords = PasswordService::new();
        let a = passwords.hash("same password here").unwrap();
        let b = passwords.hash("same password here").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn strength_check() {
        let passwords = PasswordService::new();
        assert!(passwords.check_strength("short").is_err());
        assert!(passwords.check_strength("long enough password").is_ok());
    }

    #[test]
    fn malformed_stored_hash_is_internal() {
        let passwords = PasswordService::new();
        let err = passwords.verify("anything", "not-a-phc-string").unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL");
    }
}
