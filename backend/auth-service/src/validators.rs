use validator::ValidationError;

/// Input validation utilities for auth service

const PASSWORD_SPECIALS: &str = "@$!%*?&";

/// Password rules:
/// - only letters, digits and `@$!%*?&`
/// - at least one lowercase letter, one uppercase letter, one digit and one special character
pub fn validate_password(password: &str) -> bool {
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));

    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    allowed && has_uppercase && has_lowercase && has_digit && has_special
}

/// validator crate compatible custom validator for password composition
pub fn validate_password_rules(password: &str) -> Result<(), ValidationError> {
    if validate_password(password) {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_composition");
        err.message = Some(
            "Password must contain at least one lowercase, one uppercase, one digit, and one special character"
                .into(),
        );
        Err(err)
    }
}

/// Rejects names that are only whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}
