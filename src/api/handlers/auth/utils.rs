//! Small helpers for auth input validation.

use regex::Regex;

use crate::api::error::ApiError;

pub(crate) const PASSWORD_MIN: usize = 8;
pub(crate) const PASSWORD_MAX: usize = 256;

/// Normalize an email for lookup and uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Normalize and validate an email, or fail with a validation error.
pub(crate) fn require_email(email: &str) -> Result<String, ApiError> {
    let normalized = normalize_email(email);
    if valid_email(&normalized) {
        Ok(normalized)
    } else {
        Err(ApiError::validation("Invalid email"))
    }
}

/// Lowercase, map anything outside `[a-z0-9_]` to `_` and collapse runs of `_`.
pub(crate) fn normalize_username(username: &str) -> String {
    let mut normalized = String::with_capacity(username.len());
    for c in username.trim().to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '_'
        };
        if c == '_' && normalized.ends_with('_') {
            continue;
        }
        normalized.push(c);
    }
    normalized
}

pub(crate) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-z0-9_]{3,30}$").is_ok_and(|regex| regex.is_match(username))
}

/// Character count of `value` must fall within `min..=max`.
pub(crate) fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let length = value.chars().count();
    if length < min {
        return Err(ApiError::validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if length > max {
        return Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub(crate) fn check_password(field: &str, password: &str) -> Result<(), ApiError> {
    check_length(field, password, PASSWORD_MIN, PASSWORD_MAX)
}
