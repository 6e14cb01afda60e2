//! Account field rules shared by sign-up and the operator CLI.

use crate::domain::error::DomainError;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Usernames may contain letters, digits and `@ . + - _`.
pub fn normalize_username(raw: &str) -> Result<String, DomainError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username", "This field is required."));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(
            "username",
            format!("Ensure this value has at most {MAX_USERNAME_LEN} characters."),
        ));
    }
    let allowed = |ch: char| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Err(DomainError::validation(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(username.to_string())
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!(
                "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
            ),
        ));
    }
    if password.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(DomainError::validation(
            "password",
            "This password is entirely numeric.",
        ));
    }
    Ok(())
}
