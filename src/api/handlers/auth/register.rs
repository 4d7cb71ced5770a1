//! Account registration: identity user first, then the `utenti` seed row.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{
    state::AuthState,
    types::{RegisterRequest, RegisterResponse},
    utils::{check_length, check_password, normalize_username, require_email, valid_username},
};
use crate::{
    api::error::{ApiError, ErrorBody, ValidJson},
    supabase::{IdentityError, NewUser, ProfileStore, models::AccountSeed},
};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;
const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;

/// Validated and normalized registration input.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
}

pub(crate) fn validate(request: &RegisterRequest) -> Result<Registration, ApiError> {
    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    check_length("first_name", first_name, NAME_MIN, NAME_MAX)?;
    check_length("last_name", last_name, NAME_MIN, NAME_MAX)?;
    check_length("username", request.username.trim(), USERNAME_MIN, USERNAME_MAX)?;
    let username = normalize_username(&request.username);
    if !valid_username(&username) {
        return Err(ApiError::validation(
            "Invalid username: use 3-30 characters among a-z, 0-9 and _",
        ));
    }
    let email = require_email(&request.email)?;
    check_password("password", &request.password)?;

    Ok(Registration {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        username,
        email,
    })
}

/// Signup says "User already registered", the admin API "has already been registered".
fn is_duplicate(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("already registered") || message.contains("already been registered")
}

fn registration_error(err: IdentityError) -> ApiError {
    match err {
        IdentityError::Rejected { message, .. } if is_duplicate(&message) => {
            ApiError::Conflict("Email already registered".to_string())
        }
        other => ApiError::upstream_rejected(other),
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Identity provider refused the request", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody),
        (status = 502, description = "Upstream unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    Extension(profiles): Extension<Arc<dyn ProfileStore>>,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registration = validate(&request)?;
    let identity = auth_state.identity();

    let created = identity
        .create_user(&NewUser {
            email: registration.email.clone(),
            password: request.password,
            username: registration.username.clone(),
            first_name: registration.first_name.clone(),
            last_name: registration.last_name.clone(),
        })
        .await
        .map_err(registration_error)?;

    let user_id = match created {
        Some(id) => id,
        None => identity
            .find_user_by_email(&registration.email)
            .await
            .map_err(ApiError::upstream_rejected)?
            .map(|user| user.id)
            .ok_or_else(|| {
                error!("created identity user not found by email");
                ApiError::internal("identity user id unavailable after creation")
            })?,
    };

    profiles
        .upsert_account(&AccountSeed {
            id: user_id.clone(),
            name: registration.first_name,
            username: registration.username,
            email: registration.email.clone(),
            is_active: true,
            role: "user".to_string(),
            token_version: 0,
        })
        .await?;

    info!(user_id = %user_id, "account registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user_id,
            email: registration.email,
        }),
    ))
}
