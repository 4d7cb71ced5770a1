//! JSON error envelope returned by every handler.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::supabase::{IdentityError, StoreError};

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Body of every error response.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    MissingToken(String),
    #[error("{0}")]
    InvalidToken(String),
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Too many requests. Retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MissingToken(_) | Self::InvalidToken(_) | Self::InvalidCredentials(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::Internal(detail.to_string())
    }

    /// Map an identity provider failure for endpoints where a rejection means
    /// the presented token is not valid.
    #[must_use]
    pub fn token_rejected(err: IdentityError, fallback: &str) -> Self {
        match err {
            IdentityError::Rejected { .. } => Self::InvalidToken(fallback.to_string()),
            other => Self::from(other),
        }
    }

    /// Map an identity provider failure where a rejection should be reported
    /// back to the caller as a bad request.
    #[must_use]
    pub fn upstream_rejected(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected { message, .. } => Self::BadRequest(message),
            other => Self::from(other),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unavailable(detail) => {
                error!("identity provider unavailable: {detail}");
                Self::UpstreamUnavailable("Identity provider unavailable".to_string())
            }
            IdentityError::Rejected { status, message } => {
                Self::Internal(format!("identity provider rejected request ({status}): {message}"))
            }
            IdentityError::Malformed(detail) => Self::Internal(detail),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => {
                error!("data store unavailable: {detail}");
                Self::UpstreamUnavailable("Data store unavailable".to_string())
            }
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::Rejected { status, message } => {
                Self::Internal(format!("data store rejected request ({status}): {message}"))
            }
            StoreError::Malformed(detail) => Self::Internal(detail),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };
        let message = match self {
            Self::Internal(detail) => {
                error!("internal error: {detail}");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: status.as_u16(),
            message,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// `Json` extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ValidJson<T>(pub T);

/// `Query` extractor whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ValidQuery<T>(pub T);

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}

/// Response for a handler that panicked.
pub(crate) fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}
