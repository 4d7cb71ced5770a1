//! Auth module tests.

use super::config::{AuthConfig, CookiePolicy, CookieSettings, DeploymentMode};
use super::principal::{require_admin, require_approved, require_auth};
use super::register::validate;
use super::session::SessionManager;
use super::state::AuthState;
use super::types::RegisterRequest;
use crate::api::error::ApiError;
use crate::supabase::identity::AuthUser;
use crate::supabase::models::{
    AccountSeed, ApprovalStatus, DecisionPatch, NewProfile, Profile,
};
use crate::supabase::{
    IdentityError, IdentityProvider, NewUser, ProfileStore, StoreError, TokenGrant,
};
use anyhow::Result;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header::COOKIE};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Identity provider that rotates refresh tokens like the real one.
#[derive(Default)]
struct RotatingIdentity {
    generation: Mutex<u32>,
    unreachable: bool,
}

impl RotatingIdentity {
    fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    fn grant(&self) -> TokenGrant {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        TokenGrant {
            access_token: format!("access-{generation}"),
            refresh_token: Some(format!("refresh-{generation}")),
            expires_in: Some(3600),
        }
    }

    fn current_refresh(&self) -> String {
        let generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        format!("refresh-{generation}")
    }

    fn rejected(message: &str) -> IdentityError {
        IdentityError::Rejected {
            status: 400,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RotatingIdentity {
    async fn password_grant(&self, email: &str, password: &str) -> Result<TokenGrant, IdentityError> {
        if self.unreachable {
            return Err(IdentityError::Unavailable("connect timeout".to_string()));
        }
        if email == "alice@example.com" && password == "correct horse" {
            Ok(self.grant())
        } else {
            Err(Self::rejected(""))
        }
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError> {
        if refresh_token == self.current_refresh() {
            Ok(self.grant())
        } else {
            Err(Self::rejected("Invalid Refresh Token"))
        }
    }

    async fn current_user(&self, access_token: &str) -> Result<Value, IdentityError> {
        if access_token.starts_with("access-") {
            Ok(json!({"id": "user-1", "email": "alice@example.com"}))
        } else {
            Err(IdentityError::Rejected {
                status: 401,
                message: "bad jwt".to_string(),
            })
        }
    }

    async fn update_password(&self, _: &str, _: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn recover(&self, _: &str, _: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn create_user(&self, _: &NewUser) -> Result<Option<String>, IdentityError> {
        Ok(None)
    }

    async fn find_user_by_email(&self, _: &str) -> Result<Option<AuthUser>, IdentityError> {
        Ok(None)
    }

    async fn admin_update_password(&self, _: &str, _: &str) -> Result<(), IdentityError> {
        Ok(())
    }
}

#[derive(Default)]
struct Profiles(HashMap<String, Profile>);

#[async_trait]
impl ProfileStore for Profiles {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.0.get(user_id).cloned())
    }

    async fn profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.0.values().cloned().collect())
    }

    async fn pending_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(Vec::new())
    }

    async fn upsert_account(&self, _: &AccountSeed) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_profile(&self, _: &NewProfile) -> Result<Profile, StoreError> {
        Err(StoreError::Conflict("read only".to_string()))
    }

    async fn decide(&self, _: &str, _: &DecisionPatch) -> Result<Option<Profile>, StoreError> {
        Ok(None)
    }
}

fn manager(identity: Arc<RotatingIdentity>) -> SessionManager {
    SessionManager::new(identity, CookiePolicy::default())
}

fn cookie_header(value: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(value)?);
    Ok(headers)
}

fn bearer(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_str(&format!("Bearer {token}"))?);
    Ok(headers)
}

fn cookie_strings(cookies: &[HeaderValue]) -> Vec<String> {
    cookies
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn login_sets_both_cookies() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    let session = sessions.login(" Alice@Example.com ", "correct horse").await?;
    assert_eq!(session.grant.access_token, "access-1");

    let cookies = cookie_strings(&session.cookies);
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("access_token=access-1; Path=/;"));
    assert!(cookies[1].starts_with("refresh_token=refresh-1; Path=/auth;"));
    assert!(cookies.iter().all(|cookie| cookie.contains("HttpOnly")));
    Ok(())
}

#[tokio::test]
async fn login_failures_map_to_taxonomy() {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    let wrong = sessions.login("alice@example.com", "nope").await;
    assert!(matches!(wrong, Err(ApiError::InvalidCredentials(ref m)) if m == "Invalid email or password"));

    let malformed = sessions.login("not-an-email", "whatever").await;
    assert!(matches!(malformed, Err(ApiError::Validation(_))));

    let down = manager(Arc::new(RotatingIdentity::unreachable()));
    let unavailable = down.login("alice@example.com", "correct horse").await;
    assert!(matches!(unavailable, Err(ApiError::UpstreamUnavailable(_))));
}

#[tokio::test]
async fn refresh_rotates_and_rejects_stale_token() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    sessions.login("alice@example.com", "correct horse").await?;

    let rotated = sessions
        .refresh(None, &cookie_header("refresh_token=refresh-1")?)
        .await?;
    assert_eq!(rotated.grant.refresh_token.as_deref(), Some("refresh-2"));

    let stale = sessions
        .refresh(None, &cookie_header("refresh_token=refresh-1")?)
        .await;
    assert!(matches!(stale, Err(ApiError::InvalidToken(_))));
    Ok(())
}

#[tokio::test]
async fn refresh_prefers_body_and_requires_a_token() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    sessions.login("alice@example.com", "correct horse").await?;

    let via_body = sessions
        .refresh(Some("refresh-1"), &cookie_header("refresh_token=bogus")?)
        .await?;
    assert_eq!(via_body.grant.access_token, "access-2");

    let missing = sessions.refresh(None, &HeaderMap::new()).await;
    assert!(matches!(missing, Err(ApiError::MissingToken(_))));
    Ok(())
}

#[tokio::test]
async fn who_am_i_without_tokens_is_missing() {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    let result = sessions.who_am_i(&HeaderMap::new()).await;
    assert!(matches!(result, Err(ApiError::MissingToken(_))));
}

#[tokio::test]
async fn who_am_i_refreshes_transparently() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    sessions.login("alice@example.com", "correct horse").await?;

    let who = sessions
        .who_am_i(&cookie_header("sb-refresh-token=refresh-1")?)
        .await?;
    assert_eq!(who.user.get("id"), Some(&json!("user-1")));
    let cookies = cookie_strings(&who.cookies);
    assert!(cookies.iter().any(|c| c.starts_with("access_token=access-2")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=refresh-2")));
    Ok(())
}

#[tokio::test]
async fn who_am_i_with_stale_refresh_is_missing() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    let result = sessions
        .who_am_i(&cookie_header("refresh_token=refresh-9")?)
        .await;
    assert!(matches!(result, Err(ApiError::MissingToken(_))));
    Ok(())
}

#[tokio::test]
async fn who_am_i_rejects_unknown_access_token() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    let result = sessions.who_am_i(&bearer("forged")?).await;
    assert!(matches!(result, Err(ApiError::InvalidToken(_))));
    Ok(())
}

#[test]
fn logout_clears_every_name() -> Result<()> {
    let sessions = manager(Arc::new(RotatingIdentity::default()));
    let cleared = cookie_strings(&sessions.logout());
    for name in ["access_token=", "refresh_token=", "sb-access-token=", "refreshToken="] {
        assert!(cleared.iter().any(|cookie| cookie.starts_with(name)), "{name} not cleared");
    }
    Ok(())
}

#[test]
fn local_mode_login_cookies() {
    let policy = CookiePolicy::resolve(
        DeploymentMode::Local,
        CookieSettings {
            secure: true,
            domain: Some("example.com".to_string()),
            ..CookieSettings::default()
        },
    );
    assert!(!policy.secure());
    assert_eq!(policy.domain(), None);
    assert_eq!(policy.same_site().as_str(), "Lax");
}

fn auth_state(identity: Arc<RotatingIdentity>) -> AuthState {
    AuthState::new(
        AuthConfig::new(DeploymentMode::Production, CookieSettings::default()),
        identity,
    )
}

fn profile(id: &str, role: &str, status: ApprovalStatus) -> Profile {
    Profile {
        id: Some(id.to_string()),
        role: Some(role.to_string()),
        status: Some(status),
        ..Profile::default()
    }
}

#[tokio::test]
async fn require_auth_uses_identity_provider() -> Result<()> {
    let state = auth_state(Arc::new(RotatingIdentity::default()));
    let principal = require_auth(&cookie_header("accessToken=access-7")?, &state).await?;
    assert_eq!(principal.user_id, "user-1");
    assert_eq!(principal.email.as_deref(), Some("alice@example.com"));

    let missing = require_auth(&HeaderMap::new(), &state).await;
    assert!(matches!(missing, Err(ApiError::MissingToken(_))));
    Ok(())
}

#[tokio::test]
async fn role_and_approval_checks() -> Result<()> {
    let state = auth_state(Arc::new(RotatingIdentity::default()));
    let headers = bearer("access-1")?;

    let mut rows = HashMap::new();
    rows.insert(
        "user-1".to_string(),
        profile("user-1", "user", ApprovalStatus::Pending),
    );
    let pending = Profiles(rows);
    let forbidden = require_admin(&headers, &state, &pending).await;
    assert!(matches!(forbidden, Err(ref e) if e.status() == StatusCode::FORBIDDEN));
    let unapproved = require_approved(&headers, &state, &pending).await;
    assert!(matches!(unapproved, Err(ref e) if e.status() == StatusCode::FORBIDDEN));

    let mut rows = HashMap::new();
    rows.insert(
        "user-1".to_string(),
        profile("user-1", "admin", ApprovalStatus::Approved),
    );
    let admin = Profiles(rows);
    let (principal, _) = require_admin(&headers, &state, &admin).await?;
    assert_eq!(principal.user_id, "user-1");
    assert!(require_approved(&headers, &state, &admin).await.is_ok());

    let missing = require_approved(&headers, &state, &Profiles(HashMap::new())).await;
    assert!(matches!(missing, Err(ref e) if e.status() == StatusCode::NOT_FOUND));
    Ok(())
}

fn register_request(username: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        first_name: " Mario ".to_string(),
        last_name: "Rossi".to_string(),
        username: username.to_string(),
        email: "Mario@Example.com".to_string(),
        password: password.to_string(),
    }
}

#[test]
fn register_validation_normalizes() -> Result<()> {
    let registration = validate(&register_request("Mario.Rossi", "long enough"))?;
    assert_eq!(registration.username, "mario_rossi");
    assert_eq!(registration.email, "mario@example.com");
    assert_eq!(registration.first_name, "Mario");
    Ok(())
}

#[test]
fn register_validation_rejects_bad_input() {
    assert!(matches!(
        validate(&register_request("ab", "long enough")),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        validate(&register_request(&"a".repeat(40), "long enough")),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        validate(&register_request("mario", "short")),
        Err(ApiError::Validation(_))
    ));
}
