//! Admin helpers over identity users.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    principal::require_admin,
    state::AuthState,
    types::{LookupQuery, LookupResponse, SetPasswordRequest, SetPasswordResponse},
    utils::{check_password, require_email},
};
use crate::{
    api::error::{ApiError, ErrorBody, ValidJson, ValidQuery},
    supabase::ProfileStore,
};

#[utoipa::path(
    get,
    path = "/auth/admin/lookup-user",
    params(LookupQuery),
    responses(
        (status = 200, description = "Lookup result", body = LookupResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 400, description = "Identity provider refused the search", body = ErrorBody),
        (status = 403, description = "Admin privileges required", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn lookup_user(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
    ValidQuery(query): ValidQuery<LookupQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, &auth_state, profiles.as_ref()).await?;
    let email = require_email(&query.email)?;
    let user = auth_state
        .identity()
        .find_user_by_email(&email)
        .await
        .map_err(ApiError::upstream_rejected)?;
    Ok(Json(LookupResponse {
        exists: user.is_some(),
        user_id: user.map(|user| user.id),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/admin/set-password",
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = SetPasswordResponse),
        (status = 400, description = "Identity provider refused the request", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Admin privileges required", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn set_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
    ValidJson(request): ValidJson<SetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (admin, _) = require_admin(&headers, &auth_state, profiles.as_ref()).await?;
    let email = require_email(&request.email)?;
    check_password("new_password", &request.new_password)?;

    let identity = auth_state.identity();
    let user = identity
        .find_user_by_email(&email)
        .await
        .map_err(ApiError::upstream_rejected)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    identity
        .admin_update_password(&user.id, &request.new_password)
        .await
        .map_err(ApiError::upstream_rejected)?;

    info!(admin = %admin.user_id, user_id = %user.id, "password replaced by admin");
    Ok(Json(SetPasswordResponse {
        ok: true,
        user_id: user.id,
    }))
}
