//! Session lifecycle: login, refresh, who-am-i and logout.
//!
//! No session state is kept server side. Both tokens travel as `HttpOnly`
//! cookies; the identity provider rotates the refresh token on every refresh
//! grant and rejects the previous one afterwards.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    config::CookiePolicy,
    state::AuthState,
    token::{resolve_access_token, resolve_refresh_token},
    types::{LoginRequest, LogoutResponse, RefreshRequest, TokenResponse},
    utils::require_email,
};
use crate::{
    api::error::{ApiError, ErrorBody, ValidJson},
    supabase::{IdentityError, IdentityProvider, TokenGrant},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH: &str = "Invalid refresh token";
const INVALID_ACCESS: &str = "Invalid token";
const MISSING_REFRESH: &str = "Missing refresh token";
const MISSING_ACCESS: &str = "Missing token";

/// Token pair plus the `Set-Cookie` values that hand it to the browser.
#[derive(Debug)]
pub struct Session {
    pub grant: TokenGrant,
    pub cookies: Vec<HeaderValue>,
}

/// Identity resolved by [`SessionManager::who_am_i`].
#[derive(Debug)]
pub struct WhoAmI {
    pub user: Value,
    /// Non-empty when a transparent refresh happened.
    pub cookies: Vec<HeaderValue>,
}

pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    cookies: CookiePolicy,
}

impl SessionManager {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, cookies: CookiePolicy) -> Self {
        Self { identity, cookies }
    }

    #[must_use]
    pub fn cookies(&self) -> &CookiePolicy {
        &self.cookies
    }

    /// Exchange credentials for a token pair.
    ///
    /// # Errors
    /// `InvalidCredentials` when the provider refuses, `UpstreamUnavailable`
    /// on transport failure.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let email = require_email(email)?;
        let grant = self
            .identity
            .password_grant(&email, password)
            .await
            .map_err(|err| match err {
                IdentityError::Rejected { message, .. } => {
                    debug!("password grant rejected");
                    ApiError::InvalidCredentials(if message.is_empty() {
                        INVALID_CREDENTIALS.to_string()
                    } else {
                        message
                    })
                }
                other => ApiError::from(other),
            })?;
        self.session(grant)
    }

    /// Exchange a refresh token (body first, then cookies) for a new pair.
    ///
    /// # Errors
    /// `MissingToken` when no refresh token is present, `InvalidToken` when
    /// the provider refuses it.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        body_token: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Session, ApiError> {
        let refresh_token = resolve_refresh_token(body_token, headers, &self.cookies)
            .ok_or_else(|| ApiError::MissingToken(MISSING_REFRESH.to_string()))?;
        let grant = self
            .identity
            .refresh_grant(&refresh_token)
            .await
            .map_err(|err| ApiError::token_rejected(err, INVALID_REFRESH))?;
        self.session(grant)
    }

    /// Resolve the caller, refreshing transparently when only a refresh
    /// token is present.
    ///
    /// # Errors
    /// `MissingToken` when no usable token exists, `InvalidToken` when the
    /// provider does not recognize the access token.
    #[instrument(skip_all)]
    pub async fn who_am_i(&self, headers: &HeaderMap) -> Result<WhoAmI, ApiError> {
        let (access_token, cookies) = match resolve_access_token(headers, &self.cookies) {
            Some(token) => (token, Vec::new()),
            None => {
                let refresh_token = resolve_refresh_token(None, headers, &self.cookies)
                    .ok_or_else(|| ApiError::MissingToken(MISSING_ACCESS.to_string()))?;
                let session = match self.identity.refresh_grant(&refresh_token).await {
                    Ok(grant) => self.session(grant)?,
                    Err(IdentityError::Rejected { .. }) => {
                        debug!("transparent refresh rejected");
                        return Err(ApiError::MissingToken(MISSING_ACCESS.to_string()));
                    }
                    Err(other) => return Err(other.into()),
                };
                (session.grant.access_token, session.cookies)
            }
        };

        let user = self
            .identity
            .current_user(&access_token)
            .await
            .map_err(|err| ApiError::token_rejected(err, INVALID_ACCESS))?;
        Ok(WhoAmI { user, cookies })
    }

    /// Expired cookies for every token name, including legacy aliases.
    #[must_use]
    pub fn logout(&self) -> Vec<HeaderValue> {
        self.cookies.clear_all()
    }

    fn session(&self, grant: TokenGrant) -> Result<Session, ApiError> {
        let mut cookies = vec![self
            .cookies
            .access_cookie(&grant.access_token)
            .map_err(ApiError::internal)?];
        if let Some(refresh_token) = grant.refresh_token.as_deref() {
            cookies.push(
                self.cookies
                    .refresh_cookie(refresh_token)
                    .map_err(ApiError::internal)?,
            );
        }
        Ok(Session { grant, cookies })
    }
}

/// Response headers carrying one `Set-Cookie` per value.
pub(crate) fn set_cookie_headers(cookies: Vec<HeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    headers
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued, cookies set", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 422, description = "Malformed request", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody),
        (status = 502, description = "Identity provider unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = auth_state
        .sessions()
        .login(&request.email, &request.password)
        .await?;
    Ok((
        StatusCode::OK,
        set_cookie_headers(session.cookies),
        Json(TokenResponse::from(session.grant)),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body(content = RefreshRequest, description = "Optional, for older clients"),
    responses(
        (status = 200, description = "Token pair rotated, cookies set", body = TokenResponse),
        (status = 401, description = "Missing or invalid refresh token", body = ErrorBody),
        (status = 502, description = "Identity provider unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let body_token = body.and_then(|Json(request)| request.refresh_token);
    let session = auth_state
        .sessions()
        .refresh(body_token.as_deref(), &headers)
        .await?;
    Ok((
        StatusCode::OK,
        set_cookie_headers(session.cookies),
        Json(TokenResponse::from(session.grant)),
    ))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Identity provider user object", body = serde_json::Value),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 502, description = "Identity provider unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let WhoAmI { user, cookies } = auth_state.sessions().who_am_i(&headers).await?;
    Ok((StatusCode::OK, set_cookie_headers(cookies), Json(user)))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Cookies cleared", body = LogoutResponse)
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let cookies = auth_state.sessions().logout();
    (
        StatusCode::OK,
        set_cookie_headers(cookies),
        Json(LogoutResponse {
            ok: true,
            ts: chrono::Utc::now().timestamp(),
        }),
    )
}
