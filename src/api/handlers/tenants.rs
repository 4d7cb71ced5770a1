//! Tenants (`locatari`) and their reviews, scoped to the authenticated owner.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::IntoParams;

use super::{
    auth::{AuthState, check_length, normalize_email, require_auth, valid_email},
    require_uuid,
};
use crate::{
    api::error::{ApiError, ErrorBody, ValidJson, ValidQuery},
    supabase::{
        TenantStore,
        models::{Review, ReviewInput, Tenant, TenantInput, TenantQuery},
    },
};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

const NAME_MAX: usize = 120;
const PHONE_MAX: usize = 40;
const TEXT_MAX: usize = 2000;

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Search over name, surname, email and phone.
    pub q: Option<String>,
    /// 1..=200, default 50.
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListParams {
    pub(crate) fn into_query(self) -> Result<TenantQuery, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(TenantQuery {
            search: self
                .q
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn optional_field(
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ApiError> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if value.is_empty() => Ok(None),
        Some(value) => {
            check_length(field, &value, 0, max)?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Trim and bound every field; blank optionals become null.
pub(crate) fn clean_tenant(input: TenantInput) -> Result<TenantInput, ApiError> {
    let first_name = input.first_name.trim().to_string();
    check_length("nome", &first_name, 1, NAME_MAX)?;

    let email = match optional_field("email", input.email, NAME_MAX * 2)? {
        Some(email) => {
            let email = normalize_email(&email);
            if !valid_email(&email) {
                return Err(ApiError::validation("Invalid email"));
            }
            Some(email)
        }
        None => None,
    };

    Ok(TenantInput {
        first_name,
        last_name: optional_field("cognome", input.last_name, NAME_MAX)?,
        email,
        phone: optional_field("telefono", input.phone, PHONE_MAX)?,
        notes: optional_field("note", input.notes, TEXT_MAX)?,
    })
}

pub(crate) fn clean_review(input: ReviewInput) -> Result<ReviewInput, ApiError> {
    if !(1..=5).contains(&input.rating) {
        return Err(ApiError::validation("rating must be between 1 and 5"));
    }
    Ok(ReviewInput {
        rating: input.rating,
        comment: optional_field("commento", input.comment, TEXT_MAX)?,
    })
}

fn tenant_not_found() -> ApiError {
    ApiError::NotFound("Tenant not found".to_string())
}

#[utoipa::path(
    post,
    path = "/locatari",
    request_body = TenantInput,
    responses(
        (status = 201, description = "Tenant created", body = Tenant),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip_all)]
pub async fn create_tenant(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
    ValidJson(input): ValidJson<TenantInput>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let input = clean_tenant(input)?;
    let tenant = tenants.create_tenant(&principal.user_id, &input).await?;
    info!(tenant_id = %tenant.id, "tenant created");
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[utoipa::path(
    get,
    path = "/locatari",
    params(ListParams),
    responses(
        (status = 200, description = "Tenants, newest first", body = [Tenant]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "Invalid paging", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip_all)]
pub async fn list_tenants(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
    ValidQuery(params): ValidQuery<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let query = params.into_query()?;
    Ok(Json(tenants.tenants(&principal.user_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/locatari/{loc_id}",
    params(("loc_id" = String, Path, description = "Tenant id (UUID)")),
    responses(
        (status = 200, description = "Tenant", body = Tenant),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Tenant not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip(headers, auth_state, tenants))]
pub async fn get_tenant(
    Path(loc_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let loc_id = require_uuid("loc_id", &loc_id)?;
    tenants
        .tenant(&principal.user_id, &loc_id)
        .await?
        .map(Json)
        .ok_or_else(tenant_not_found)
}

#[utoipa::path(
    put,
    path = "/locatari/{loc_id}",
    params(("loc_id" = String, Path, description = "Tenant id (UUID)")),
    request_body = TenantInput,
    responses(
        (status = 200, description = "Tenant updated", body = Tenant),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Tenant not found", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip(headers, auth_state, tenants, input))]
pub async fn update_tenant(
    Path(loc_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
    ValidJson(input): ValidJson<TenantInput>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let loc_id = require_uuid("loc_id", &loc_id)?;
    let input = clean_tenant(input)?;
    tenants
        .update_tenant(&principal.user_id, &loc_id, &input)
        .await?
        .map(Json)
        .ok_or_else(tenant_not_found)
}

#[utoipa::path(
    delete,
    path = "/locatari/{loc_id}",
    params(("loc_id" = String, Path, description = "Tenant id (UUID)")),
    responses(
        (status = 204, description = "Tenant deleted (or already absent)"),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip(headers, auth_state, tenants))]
pub async fn delete_tenant(
    Path(loc_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let loc_id = require_uuid("loc_id", &loc_id)?;
    tenants.delete_tenant(&principal.user_id, &loc_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/locatari/{loc_id}/recensioni",
    params(("loc_id" = String, Path, description = "Tenant id (UUID)")),
    responses(
        (status = 200, description = "Reviews, newest first", body = [Review]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Tenant not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip(headers, auth_state, tenants))]
pub async fn list_reviews(
    Path(loc_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let loc_id = require_uuid("loc_id", &loc_id)?;
    if tenants.tenant(&principal.user_id, &loc_id).await?.is_none() {
        return Err(tenant_not_found());
    }
    Ok(Json(tenants.reviews(&principal.user_id, &loc_id).await?))
}

#[utoipa::path(
    post,
    path = "/locatari/{loc_id}/recensioni",
    params(("loc_id" = String, Path, description = "Tenant id (UUID)")),
    request_body = ReviewInput,
    responses(
        (status = 201, description = "Review added", body = Review),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Tenant not found", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "locatari"
)]
#[instrument(skip(headers, auth_state, tenants, input))]
pub async fn create_review(
    Path(loc_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(tenants): Extension<Arc<dyn TenantStore>>,
    ValidJson(input): ValidJson<ReviewInput>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let loc_id = require_uuid("loc_id", &loc_id)?;
    let input = clean_review(input)?;
    if tenants.tenant(&principal.user_id, &loc_id).await?.is_none() {
        return Err(tenant_not_found());
    }
    let review = tenants
        .create_review(&principal.user_id, &loc_id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}
