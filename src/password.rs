//! Password hashing with bcrypt at a fixed cost.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};

/// bcrypt work factor; hashing takes tens of milliseconds on purpose.
pub const BCRYPT_COST: u32 = 12;

/// Hash a plaintext password for storage.
pub fn hash_password(password: &SecretString) -> Result<String> {
    bcrypt::hash(password.expose_secret(), BCRYPT_COST).context("failed to hash password")
}

/// Compare a candidate password against a stored hash.
///
/// A malformed stored hash is an infrastructure error, not a mismatch.
pub fn verify_password(password: &SecretString, hash: &str) -> Result<bool> {
    bcrypt::verify(password.expose_secret(), hash).context("failed to verify password")
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_password};
    use secrecy::SecretString;

    #[test]
    fn hash_and_verify_round_trip() {
        let password = SecretString::from("StrongPass123!");
        let hash = hash_password(&password).unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password(&password, &hash).unwrap());
        assert!(!verify_password(&SecretString::from("WrongPass123!"), &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let password = SecretString::from("StrongPass123!");
        assert!(verify_password(&password, "not-a-bcrypt-hash").is_err());
    }
}
