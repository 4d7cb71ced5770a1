//! API handlers and shared utilities for Affitti.
//!
//! Handlers validate input, resolve the caller and forward to the identity
//! provider or the data store; they never hold state of their own.

pub mod auth;
pub mod health;
pub mod tenants;
pub mod users;

use crate::api::error::ApiError;

/// Path ids end up in data-store filters, so they must be UUIDs.
pub(crate) fn require_uuid(field: &str, value: &str) -> Result<String, ApiError> {
    uuid::Uuid::parse_str(value.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| ApiError::validation(format!("{field} must be a UUID")))
}
