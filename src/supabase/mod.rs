//! Clients for the Supabase services the API delegates to.
//!
//! - [`identity`]: the `GoTrue` auth server (credential checks, token
//!   issuance and rotation, recovery, admin user management).
//! - [`store`]: the `PostgREST` data API backing profiles, tenants and reviews.
//!
//! Both sides are traits so handlers can be exercised against in-memory
//! implementations.

pub mod identity;
pub mod models;
pub mod store;

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::SecretString;
use std::time::Duration;

pub use identity::{GoTrueClient, IdentityError, IdentityProvider, NewUser, TokenGrant};
pub use store::{PostgrestStore, ProfileStore, StoreError, TenantStore};

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Connection settings shared by the identity and data clients.
#[derive(Clone)]
pub struct SupabaseConfig {
    url: String,
    anon_key: SecretString,
    service_role_key: SecretString,
    timeout: Duration,
}

impl SupabaseConfig {
    #[must_use]
    pub fn new(url: &str, anon_key: SecretString, service_role_key: SecretString) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            service_role_key,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn anon_key(&self) -> &SecretString {
        &self.anon_key
    }

    #[must_use]
    pub fn service_role_key(&self) -> &SecretString {
        &self.service_role_key
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the HTTP client used for every outbound call.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .context("Error creating reqwest client")
    }
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"***")
            .field("service_role_key", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Pull a human readable message out of a Supabase error body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
