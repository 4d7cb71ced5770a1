//! Auth handlers and supporting modules.
//!
//! Credentials and tokens are owned by the identity provider; this module only
//! moves tokens between the provider and the browser cookie jar.
//!
//! ## Cookies
//!
//! The access token lives in a short-lived cookie at `/`, the refresh token in
//! a long-lived cookie scoped to `/auth`. Both are `HttpOnly`. In local mode
//! the attributes are forced to `SameSite=Lax`, no `Secure` and no `Domain`
//! so the frontend can talk to the API over plain HTTP on another port.
//!
//! ## Token lookup
//!
//! `Authorization: Bearer` wins over cookies. Cookies are read by configured
//! name first, then by a fixed list of legacy aliases.

pub(crate) mod admin;
pub mod config;
pub(crate) mod cookies;
pub(crate) mod password;
pub mod principal;
pub(crate) mod register;
pub mod session;
mod state;
pub mod token;
pub(crate) mod types;
mod utils;

pub use config::{AuthConfig, CookiePolicy, CookieSettings, DeploymentMode, SameSite};
pub use principal::{Principal, require_admin, require_approved, require_auth};
pub use session::SessionManager;
pub use state::AuthState;
pub(crate) use utils::{check_length, normalize_email, valid_email};

#[cfg(test)]
mod tests;
