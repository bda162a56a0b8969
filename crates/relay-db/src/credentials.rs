use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Hash a plaintext credential into an Argon2id PHC string.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Check a plaintext credential against a stored PHC string.
/// A mismatch is `Ok(false)`; only an unreadable stored hash is an error.
pub fn verify(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("Corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Stored hash checked when the username does not exist, so an unknown user
/// costs one Argon2 verify just like a wrong password.
static ABSENT_USER_HASH: LazyLock<Result<String, String>> =
    LazyLock::new(|| hash("absent-user").map_err(|e| e.to_string()));

/// Burn one verify against a throwaway hash. Always `Ok(false)`.
pub fn verify_absent(password: &str) -> Result<bool> {
    let stored = ABSENT_USER_HASH
        .as_ref()
        .map_err(|e| anyhow!("Password hashing failed: {}", e))?;
    verify(password, stored)?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash("pw1").unwrap();
        assert_ne!(stored, "pw1");
        assert!(verify("pw1", &stored).unwrap());
        assert!(!verify("pw2", &stored).unwrap());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash("same").unwrap(), hash("same").unwrap());
    }

    #[test]
    fn absent_user_never_verifies() {
        assert!(!verify_absent("absent-user").unwrap());
        assert!(!verify_absent("pw1").unwrap());
        assert!(PasswordHash::new(ABSENT_USER_HASH.as_ref().unwrap()).is_ok());
    }

    #[test]
    fn corrupt_hash_is_error() {
        assert!(verify("pw1", "not-a-phc-string").is_err());
    }
}
