//! Password recovery: request a reset email, then set the new password with
//! the recovery bearer the email link carries.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use std::sync::Arc;
use tracing::instrument;

use super::{
    state::AuthState,
    token::bearer_token,
    types::{ForgotRequest, OkResponse, ResetRequest},
    utils::{check_password, require_email},
};
use crate::api::error::{ApiError, ErrorBody, ValidJson};

#[utoipa::path(
    post,
    path = "/auth/forgot",
    request_body = ForgotRequest,
    responses(
        (status = 200, description = "Recovery email requested", body = OkResponse),
        (status = 400, description = "Identity provider refused the request", body = ErrorBody),
        (status = 422, description = "Invalid email", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot(
    auth_state: Extension<Arc<AuthState>>,
    ValidJson(request): ValidJson<ForgotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = require_email(&request.email)?;
    auth_state
        .identity()
        .recover(&email, auth_state.config().reset_url())
        .await
        .map_err(ApiError::upstream_rejected)?;
    Ok(Json(OkResponse { ok: true }))
}

#[utoipa::path(
    post,
    path = "/auth/reset",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Password updated", body = OkResponse),
        (status = 400, description = "Identity provider refused the request", body = ErrorBody),
        (status = 401, description = "Missing recovery token", body = ErrorBody),
        (status = 422, description = "Invalid password", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    ValidJson(request): ValidJson<ResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::MissingToken("Missing recovery token".to_string()))?;
    check_password("new_password", &request.new_password)?;
    auth_state
        .identity()
        .update_password(&token, &request.new_password)
        .await
        .map_err(ApiError::upstream_rejected)?;
    Ok(Json(OkResponse { ok: true }))
}
