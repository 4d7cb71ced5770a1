//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: resolve the access token (header, then cookies), verify it
//! locally when a JWT secret is configured, otherwise ask the identity
//! provider who owns it. Role and approval checks read the `utenti` profile.

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{state::AuthState, token::resolve_access_token};
use crate::{
    api::error::ApiError,
    supabase::{ProfileStore, models::{ApprovalStatus, Profile}},
};

/// Authenticated user context derived from the access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl Claims {
    fn into_principal(self) -> Option<Principal> {
        let user_id = self
            .sub
            .or(self.user_id)
            .or(self.id)
            .filter(|id| !id.is_empty())?;
        Some(Principal {
            user_id,
            email: self.email,
        })
    }
}

/// HS256 verification with a required, unexpired `exp`. Audience is not checked.
fn verify_locally(token: &str, secret: &SecretString) -> Option<Principal> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    ) {
        Ok(data) => data.claims.into_principal(),
        Err(err) => {
            debug!("local token verification failed: {err}");
            None
        }
    }
}

fn principal_from_user(user: &Value) -> Option<Principal> {
    let user_id = user
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;
    Some(Principal {
        user_id: user_id.to_string(),
        email: user.get("email").and_then(Value::as_str).map(str::to_string),
    })
}

/// Resolve the caller, or fail with 401.
///
/// # Errors
/// `MissingToken` when no token is present, `InvalidToken` when neither local
/// verification nor the identity provider yields a subject.
pub async fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, ApiError> {
    let token = resolve_access_token(headers, state.config().cookies())
        .ok_or_else(|| ApiError::MissingToken("Missing token".to_string()))?;

    if let Some(principal) = state
        .config()
        .jwt_secret()
        .and_then(|secret| verify_locally(&token, secret))
    {
        return Ok(principal);
    }

    let user = state
        .identity()
        .current_user(&token)
        .await
        .map_err(|err| ApiError::token_rejected(err, "Invalid token"))?;
    principal_from_user(&user).ok_or_else(|| ApiError::InvalidToken("Invalid token".to_string()))
}

/// Like [`require_auth`], plus the `admin` role on the caller's profile.
///
/// # Errors
/// 401 as for [`require_auth`], 403 when the caller is not an admin.
pub async fn require_admin(
    headers: &HeaderMap,
    state: &AuthState,
    profiles: &dyn ProfileStore,
) -> Result<(Principal, Profile), ApiError> {
    let principal = require_auth(headers, state).await?;
    let profile = profiles.profile(&principal.user_id).await?;
    match profile {
        Some(profile) if profile.is_admin() => Ok((principal, profile)),
        _ => Err(ApiError::Forbidden("Admin privileges required".to_string())),
    }
}

/// Like [`require_auth`], plus an approved profile.
///
/// # Errors
/// 401 as for [`require_auth`], 404 when the profile is missing, 403 when it
/// is not approved.
pub async fn require_approved(
    headers: &HeaderMap,
    state: &AuthState,
    profiles: &dyn ProfileStore,
) -> Result<(Principal, Profile), ApiError> {
    let principal = require_auth(headers, state).await?;
    let profile = profiles.profile(&principal.user_id).await?;
    match profile {
        Some(profile) if profile.status == Some(ApprovalStatus::Approved) => {
            Ok((principal, profile))
        }
        Some(_) => Err(ApiError::Forbidden("Account not approved".to_string())),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}
