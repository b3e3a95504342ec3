/// Password hashing and verification
///
/// bcrypt hashing plus strength validation applied before any hash is
/// produced.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password with bcrypt after validating its strength.
///
/// # Errors
/// Returns error if the password fails validation or hashing fails.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Requirements:
/// - 8 to 128 characters
/// - at least one digit, one lowercase, one uppercase,
///   and one special character
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // bcrypt limitation and DoS prevention
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if !has_digit || !has_lowercase || !has_uppercase || !has_special {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, one uppercase letter, and one special character"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "ValidPass123!";
        let hash = hash_password(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("WrongPass123!", &hash).unwrap());
    }

    #[test]
    fn too_short_password_rejected() {
        assert!(hash_password("Sh0rt!").is_err());
    }

    #[test]
    fn too_long_password_rejected() {
        let long_password = format!("Aa1!{}", "a".repeat(MAX_PASSWORD_LENGTH));
        assert!(hash_password(&long_password).is_err());
    }

    #[test]
    fn missing_character_classes_rejected() {
        assert!(hash_password("nouppercase1!").is_err());
        assert!(hash_password("NOLOWERCASE1!").is_err());
        assert!(hash_password("NoDigitsHere!").is_err());
        assert!(hash_password("NoSpecial123").is_err());
    }

    #[test]
    fn valid_password_accepted() {
        assert!(hash_password("ValidPass123!").is_ok());
    }
}
