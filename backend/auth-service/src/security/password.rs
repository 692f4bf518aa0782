/// Password hashing and verification using Argon2id
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use crate::error::{AuthError, AuthResult};

/// Hash a password using Argon2id
/// Returns the PHC string suitable for storage in database
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::Internal("Failed to hash password".to_string()))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> AuthResult<()> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AuthError::Internal("Invalid password hash format".to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "SecurePass123!";
        let hash = hash_password(password).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash).is_ok());
    }

    #[test]
    fn test_wrong_password() {
        let hash = hash_password("SecurePass123!").unwrap();
        assert!(matches!(
            verify_password("WrongPass123!", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(
            hash_password("SecurePass123!").unwrap(),
            hash_password("SecurePass123!").unwrap()
        );
    }

    #[test]
    fn test_corrupt_hash_is_internal() {
        assert!(matches!(
            verify_password("SecurePass123!", "not-a-phc-string"),
            Err(AuthError::Internal(_))
        ));
    }
}
