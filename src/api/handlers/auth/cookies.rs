//! Token cookies: reading, issuing and clearing.
//!
//! Besides the configured names, a fixed list of legacy aliases set by older
//! frontends is read and cleared. Nothing is ever issued under an alias.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

use super::config::CookiePolicy;

pub const ACCESS_COOKIE_ALIASES: [&str; 3] = ["sb-access-token", "accessToken", "sb-accessToken"];
pub const REFRESH_COOKIE_ALIASES: [&str; 3] =
    ["sb-refresh-token", "refreshToken", "sb-refreshToken"];

pub const ACCESS_COOKIE_PATH: &str = "/";
pub const REFRESH_COOKIE_PATH: &str = "/auth";

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// First non-empty value of cookie `name` across every `Cookie` header.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

/// First non-empty value among `names`, in order.
pub fn read_first_cookie<'a, I>(headers: &HeaderMap, names: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .find_map(|name| read_cookie(headers, name))
}

fn build(
    policy: &CookiePolicy,
    name: &str,
    value: &str,
    path: &str,
    max_age: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{name}={value}; Path={path}; Max-Age={max_age}; HttpOnly; SameSite={}",
        policy.same_site()
    );
    if max_age == 0 {
        cookie.push_str("; Expires=");
        cookie.push_str(EXPIRED);
    }
    if policy.secure() {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = policy.domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    HeaderValue::from_str(&cookie)
}

impl CookiePolicy {
    /// `Set-Cookie` value carrying the access token.
    ///
    /// # Errors
    /// Returns an error if the token is not a valid header value.
    pub fn access_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        build(
            self,
            self.access_name(),
            token,
            ACCESS_COOKIE_PATH,
            self.access_max_age(),
        )
    }

    /// `Set-Cookie` value carrying the refresh token, scoped to `/auth`.
    ///
    /// # Errors
    /// Returns an error if the token is not a valid header value.
    pub fn refresh_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        build(
            self,
            self.refresh_name(),
            token,
            REFRESH_COOKIE_PATH,
            self.refresh_max_age(),
        )
    }

    /// Expired cookies for the configured names and every legacy alias.
    #[must_use]
    pub fn clear_all(&self) -> Vec<HeaderValue> {
        let canonical = [
            (self.access_name(), ACCESS_COOKIE_PATH),
            (self.refresh_name(), REFRESH_COOKIE_PATH),
        ];
        let aliases = ACCESS_COOKIE_ALIASES
            .iter()
            .chain(REFRESH_COOKIE_ALIASES.iter())
            .map(|alias| (*alias, ACCESS_COOKIE_PATH));

        canonical
            .into_iter()
            .chain(aliases)
            // Names come from configuration and constants; both are header safe.
            .filter_map(|(name, path)| build(self, name, "", path, 0).ok())
            .collect()
    }

    /// Access cookie names in lookup order.
    pub fn access_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.access_name()).chain(ACCESS_COOKIE_ALIASES)
    }

    /// Refresh cookie names in lookup order.
    pub fn refresh_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.refresh_name()).chain(REFRESH_COOKIE_ALIASES)
    }
}
