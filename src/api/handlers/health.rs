use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

pub const SERVICE_NAME: &str = "Affitti API";

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Status {
    status: String,
}

impl Status {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Service {
    ok: bool,
    service: String,
}

/// `name:version:short-commit`, empty hash outside a git checkout.
fn x_app_headers() -> HeaderMap {
    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    };

    format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )
    .parse::<HeaderValue>()
    .map(|x_app_header_value| {
        debug!("X-App header: {:?}", x_app_header_value);
        let mut headers = HeaderMap::new();
        headers.insert("X-App", x_app_header_value);
        headers
    })
    .unwrap_or_else(|err| {
        error!("Failed to parse X-App header: {}", err);
        HeaderMap::new()
    })
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = Service)
    ),
    tag = "health"
)]
pub async fn root() -> impl IntoResponse {
    Json(Service {
        ok: true,
        service: SERVICE_NAME.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = Status)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(method: Method) -> impl IntoResponse {
    let body = if method == Method::GET {
        Json(Status::ok()).into_response()
    } else {
        Body::empty().into_response()
    };
    (StatusCode::OK, x_app_headers(), body)
}

#[utoipa::path(
    get,
    path = "/ping",
    responses(
        (status = 200, description = "Pong", body = Status)
    ),
    tag = "health"
)]
pub async fn ping() -> impl IntoResponse {
    Json(Status::ok())
}
