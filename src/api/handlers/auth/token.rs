//! Token resolution from request headers.

use axum::http::{HeaderMap, header::AUTHORIZATION};

use super::{config::CookiePolicy, cookies::read_first_cookie};

const BEARER_PREFIX: &str = "bearer ";

/// Token from an `Authorization: Bearer` header, case-insensitive prefix.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = value[BEARER_PREFIX.len()..].trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Access token from the header, then the access cookie names in order.
pub fn resolve_access_token(headers: &HeaderMap, cookies: &CookiePolicy) -> Option<String> {
    bearer_token(headers).or_else(|| read_first_cookie(headers, cookies.access_names()))
}

/// Refresh token from an explicit body value, then the refresh cookie names.
pub fn resolve_refresh_token(
    body_token: Option<&str>,
    headers: &HeaderMap,
    cookies: &CookiePolicy,
) -> Option<String> {
    body_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .or_else(|| read_first_cookie(headers, cookies.refresh_names()))
}
