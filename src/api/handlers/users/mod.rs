//! Profiles (`utenti`): listing, self-registration for approval and admin
//! decisions.
//!
//! Registration here is the second step after `/auth/register`: the caller
//! is already authenticated and submits either a private-person or a company
//! profile, which stays `pending` until an admin approves or rejects it.

mod types;
mod validation;

pub use types::{AdminDecision, CompanyRegistration, DecisionAction, PrivateRegistration};

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    auth::{AuthState, Principal, check_length, require_admin, require_approved, require_auth},
    require_uuid,
};
use crate::{
    api::{
        email::Notifier,
        error::{ApiError, ErrorBody, ValidJson},
    },
    supabase::{
        ProfileStore, StoreError,
        models::{AccountKind, ApprovalStatus, DecisionPatch, NewProfile, Profile},
    },
};

const COMPANY_NAME_MIN: usize = 2;
const COMPANY_NAME_MAX: usize = 200;

fn optional_trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn private_profile(
    user_id: &str,
    body: PrivateRegistration,
) -> Result<NewProfile, ApiError> {
    let email = super::auth::normalize_email(&body.email);
    if !super::auth::valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }
    Ok(NewProfile {
        id: user_id.to_string(),
        email,
        name: optional_trimmed(body.nome),
        username: optional_trimmed(body.username),
        kind: AccountKind::Individual,
        tax_code: Some(validation::tax_code(&body.codice_fiscale)?),
        vat_number: None,
        company_name: None,
        status: ApprovalStatus::Pending,
        is_active: true,
        role: "user".to_string(),
    })
}

pub(crate) fn company_profile(
    user_id: &str,
    body: CompanyRegistration,
) -> Result<NewProfile, ApiError> {
    let email = super::auth::normalize_email(&body.email);
    if !super::auth::valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }
    let company_name = body.ragione_sociale.trim();
    check_length("ragione_sociale", company_name, COMPANY_NAME_MIN, COMPANY_NAME_MAX)?;
    Ok(NewProfile {
        id: user_id.to_string(),
        email,
        name: optional_trimmed(body.nome),
        username: optional_trimmed(body.username),
        kind: AccountKind::Company,
        tax_code: None,
        vat_number: Some(validation::vat_number(&body.partita_iva)?),
        company_name: Some(company_name.to_string()),
        status: ApprovalStatus::Pending,
        is_active: true,
        role: "user".to_string(),
    })
}

/// Patch for an admin decision. Rejections must carry a reason.
pub(crate) fn decision_patch(
    decision: AdminDecision,
    admin_id: &str,
    decided_at: String,
) -> Result<DecisionPatch, ApiError> {
    match decision.azione {
        DecisionAction::Approve => Ok(DecisionPatch {
            status: ApprovalStatus::Approved,
            rejection_reason: None,
            approved_at: decided_at,
            approved_by: admin_id.to_string(),
            is_active: true,
        }),
        DecisionAction::Reject => {
            let reason = optional_trimmed(decision.motivo_rifiuto).ok_or_else(|| {
                ApiError::validation("motivo_rifiuto is required to reject a profile")
            })?;
            Ok(DecisionPatch {
                status: ApprovalStatus::Rejected,
                rejection_reason: Some(reason),
                approved_at: decided_at,
                approved_by: admin_id.to_string(),
                is_active: false,
            })
        }
    }
}

/// Insert a pending profile unless the caller already has one.
async fn submit(
    principal: &Principal,
    profile: NewProfile,
    profiles: &dyn ProfileStore,
    notifier: &Notifier,
) -> Result<Profile, ApiError> {
    if profiles.profile(&principal.user_id).await?.is_some() {
        return Err(ApiError::Conflict("Profile already exists".to_string()));
    }
    let created = profiles
        .insert_profile(&profile)
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => ApiError::Conflict("Profile already exists".to_string()),
            other => other.into(),
        })?;
    info!(user_id = %principal.user_id, kind = profile.kind.as_str(), "profile submitted");
    notifier.notify_new_signup(&created);
    Ok(created)
}

#[utoipa::path(
    get,
    path = "/utenti",
    responses(
        (status = 200, description = "Profiles, newest first", body = [Profile]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "utenti"
)]
#[instrument(skip_all)]
pub async fn list_users(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&headers, &auth_state).await?;
    Ok(Json(profiles.profiles().await?))
}

#[utoipa::path(
    get,
    path = "/utenti/me",
    responses(
        (status = 200, description = "Own profile", body = Profile),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Account not approved", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "utenti"
)]
#[instrument(skip_all)]
pub async fn me(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, profile) = require_approved(&headers, &auth_state, profiles.as_ref()).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    get,
    path = "/utenti/{user_id}",
    params(("user_id" = String, Path, description = "Profile id (UUID)")),
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 422, description = "Invalid id", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "utenti"
)]
#[instrument(skip(headers, auth_state, profiles))]
pub async fn get_user(
    Path(user_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&headers, &auth_state).await?;
    let user_id = require_uuid("user_id", &user_id)?;
    profiles
        .profile(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/utenti/register/privato",
    request_body = PrivateRegistration,
    responses(
        (status = 201, description = "Profile submitted for approval", body = Profile),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 409, description = "Profile already exists", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "utenti"
)]
#[instrument(skip_all)]
pub async fn register_private(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
    Extension(notifier): Extension<Arc<Notifier>>,
    ValidJson(body): ValidJson<PrivateRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let profile = private_profile(&principal.user_id, body)?;
    let created = submit(&principal, profile, profiles.as_ref(), &notifier).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/utenti/register/azienda",
    request_body = CompanyRegistration,
    responses(
        (status = 201, description = "Profile submitted for approval", body = Profile),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 409, description = "Profile already exists", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "utenti"
)]
#[instrument(skip_all)]
pub async fn register_company(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
    Extension(notifier): Extension<Arc<Notifier>>,
    ValidJson(body): ValidJson<CompanyRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state).await?;
    let profile = company_profile(&principal.user_id, body)?;
    let created = submit(&principal, profile, profiles.as_ref(), &notifier).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/utenti/admin/pending",
    responses(
        (status = 200, description = "Pending profiles, oldest first", body = [Profile]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Admin privileges required", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn list_pending(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, &auth_state, profiles.as_ref()).await?;
    Ok(Json(profiles.pending_profiles().await?))
}

#[utoipa::path(
    patch,
    path = "/utenti/admin/{user_id}",
    params(("user_id" = String, Path, description = "Profile id (UUID)")),
    request_body = AdminDecision,
    responses(
        (status = 200, description = "Decision applied", body = Profile),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Admin privileges required", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 422, description = "Invalid decision", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(headers, auth_state, profiles, notifier, decision))]
pub async fn decide(
    Path(user_id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
    Extension(notifier): Extension<Arc<Notifier>>,
    ValidJson(decision): ValidJson<AdminDecision>,
) -> Result<impl IntoResponse, ApiError> {
    let (admin, _) = require_admin(&headers, &auth_state, profiles.as_ref()).await?;
    let user_id = require_uuid("user_id", &user_id)?;
    let patch = decision_patch(decision, &admin.user_id, chrono::Utc::now().to_rfc3339())?;

    let updated = profiles
        .decide(&user_id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(admin = %admin.user_id, user_id = %user_id, status = patch.status.as_str(), "profile decided");
    if let Some(email) = updated.email.as_deref() {
        notifier.notify_decision(email, patch.status, patch.rejection_reason.as_deref());
    }
    Ok(Json(updated))
}
