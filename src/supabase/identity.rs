//! Identity provider client (`GoTrue`).
//!
//! The provider owns password storage, credential verification and token
//! signing. This module only forwards requests and reshapes responses; tokens
//! are treated as opaque strings.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{SupabaseConfig, error_message};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected identity provider response: {0}")]
    Malformed(String),
}

impl IdentityError {
    /// Message suitable for the client, without transport details.
    #[must_use]
    pub fn public_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

/// Token pair returned by the password and refresh grants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Identity user as returned by the admin API.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Account to create through the admin API.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange credentials for a token pair.
    async fn password_grant(&self, email: &str, password: &str)
        -> Result<TokenGrant, IdentityError>;

    /// Exchange a refresh token for a new pair; the provider rotates the
    /// refresh token and rejects the previous one afterwards.
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError>;

    /// Resolve the user owning an access token.
    async fn current_user(&self, access_token: &str) -> Result<Value, IdentityError>;

    /// Set a new password using a recovery (or access) bearer token.
    async fn update_password(
        &self,
        bearer_token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Ask the provider to send a recovery email.
    async fn recover(&self, email: &str, redirect_to: &str) -> Result<(), IdentityError>;

    /// Create a confirmed user and return its id, if the provider reported one.
    async fn create_user(&self, user: &NewUser) -> Result<Option<String>, IdentityError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, IdentityError>;

    async fn admin_update_password(
        &self,
        user_id: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;
}

/// `GoTrue` REST client.
#[derive(Clone, Debug)]
pub struct GoTrueClient {
    client: Client,
    auth_url: String,
    anon_key: SecretString,
    service_role_key: SecretString,
}

impl GoTrueClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            auth_url: format!("{}/auth/v1", config.url()),
            anon_key: config.anon_key().clone(),
            service_role_key: config.service_role_key().clone(),
        })
    }

    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.anon_key.expose_secret();
        builder.header("apikey", key).bearer_auth(key)
    }

    fn user(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(token)
    }

    fn service(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.service_role_key.expose_secret();
        builder.header("apikey", key).bearer_auth(key)
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<TokenGrant, IdentityError> {
        let request = self
            .client
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let response = send(self.anon(request)).await?;
        let response = expect_status(response, &[StatusCode::OK]).await?;
        response
            .json::<TokenGrant>()
            .await
            .map_err(|err| IdentityError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    #[instrument(skip(self, password))]
    async fn password_grant(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenGrant, IdentityError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    #[instrument(skip_all)]
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    #[instrument(skip_all)]
    async fn current_user(&self, access_token: &str) -> Result<Value, IdentityError> {
        let request = self.client.get(format!("{}/user", self.auth_url));
        let response = send(self.user(request, access_token)).await?;
        let response = expect_status(response, &[StatusCode::OK]).await?;
        response
            .json::<Value>()
            .await
            .map_err(|err| IdentityError::Malformed(err.to_string()))
    }

    #[instrument(skip_all)]
    async fn update_password(
        &self,
        bearer_token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let request = self
            .client
            .put(format!("{}/user", self.auth_url))
            .json(&json!({ "password": new_password }));
        let response = send(self.user(request, bearer_token)).await?;
        expect_status(response, &[StatusCode::OK]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recover(&self, email: &str, redirect_to: &str) -> Result<(), IdentityError> {
        let request = self
            .client
            .post(format!("{}/recover", self.auth_url))
            .json(&json!({ "email": email, "redirect_to": redirect_to }));
        let response = send(self.anon(request)).await?;
        expect_status(response, &[StatusCode::OK, StatusCode::NO_CONTENT]).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(email = %user.email))]
    async fn create_user(&self, user: &NewUser) -> Result<Option<String>, IdentityError> {
        let request = self
            .client
            .post(format!("{}/admin/users", self.auth_url))
            .json(&json!({
                "email": user.email,
                "password": user.password,
                "email_confirm": true,
                "user_metadata": {
                    "username": user.username,
                    "first_name": user.first_name,
                    "last_name": user.last_name,
                },
            }));
        let response = send(self.service(request)).await?;
        let response = expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|err| IdentityError::Malformed(err.to_string()))?;
        Ok(created_user_id(&body))
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, IdentityError> {
        let request = self
            .client
            .get(format!("{}/admin/users", self.auth_url))
            .query(&[("email", email)]);
        let response = send(self.service(request)).await?;
        let response = expect_status(response, &[StatusCode::OK]).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|err| IdentityError::Malformed(err.to_string()))?;
        Ok(pick_user_by_email(body, email))
    }

    #[instrument(skip(self, new_password))]
    async fn admin_update_password(
        &self,
        user_id: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let request = self
            .client
            .put(format!("{}/admin/users/{user_id}", self.auth_url))
            .json(&json!({
                "password": new_password,
                "email_confirm": true,
                "email_confirmed_at": chrono::Utc::now().to_rfc3339(),
            }));
        let response = send(self.service(request)).await?;
        expect_status(response, &[StatusCode::OK]).await?;
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> Result<Response, IdentityError> {
    request
        .send()
        .await
        .map_err(|err| IdentityError::Unavailable(err.to_string()))
}

async fn expect_status(
    response: Response,
    accepted: &[StatusCode],
) -> Result<Response, IdentityError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!("identity provider answered {status}");
    Err(IdentityError::Rejected {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// `GoTrue` returns the user object itself; older versions wrapped it in `user`.
fn created_user_id(body: &Value) -> Option<String> {
    body.get("id")
        .or_else(|| body.get("user").and_then(|user| user.get("id")))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// The admin listing is either `{"users": [...]}` or a bare array. The
/// `email` filter is not honoured by every provider version, so only an
/// exact (case-insensitive) match counts.
fn pick_user_by_email(body: Value, email: &str) -> Option<AuthUser> {
    let users = match body {
        Value::Object(mut map) => map.remove("users")?,
        other => other,
    };
    let users: Vec<AuthUser> = serde_json::from_value(users).ok()?;
    users.into_iter().find(|user| {
        user.email
            .as_deref()
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
    })
}
