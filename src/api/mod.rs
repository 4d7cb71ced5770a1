use crate::supabase::{ProfileStore, TenantStore};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::SET_COOKIE},
    middleware,
};
use regex::Regex;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod error;
pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;
pub mod rate_limit;

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";
const LOCAL_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];
const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the handlers reach through `Extension`, plus the limiter.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<handlers::auth::AuthState>,
    pub profiles: Arc<dyn ProfileStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub notifier: Arc<email::Notifier>,
    pub limiter: Arc<rate_limit::FixedWindowLimiter>,
}

/// Full application: documented routes, swagger UI and middleware stack.
///
/// Layer order, outermost first: request id, trace, catch-panic, CORS,
/// rate limiter, routes.
pub fn app(services: &Services, cors: CorsLayer) -> Router {
    let (router, openapi) = router().split_for_parts();
    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .fallback(error::not_found)
        .layer(Extension(Arc::clone(&services.auth)))
        .layer(Extension(Arc::clone(&services.profiles)))
        .layer(Extension(Arc::clone(&services.tenants)))
        .layer(Extension(Arc::clone(&services.notifier)))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&services.limiter),
            rate_limit::enforce,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::custom(error::panic_response))
                .layer(cors),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, services: Services, frontend_prod: &str) -> Result<()> {
    let cors = cors_layer(frontend_prod)?;
    let sweeper = rate_limit::spawn_sweeper(Arc::clone(&services.limiter));
    let app = app(&services, cors);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    Ok(())
}

/// Credentialed CORS for the local frontend, the production frontend and
/// Vercel preview deployments.
///
/// # Errors
/// Returns an error if the production origin is not a valid header value.
pub fn cors_layer(frontend_prod: &str) -> Result<CorsLayer> {
    let mut exact = LOCAL_ORIGINS.map(str::to_string).to_vec();
    let frontend_prod = frontend_prod.trim().trim_end_matches('/');
    if !frontend_prod.is_empty() {
        HeaderValue::from_str(frontend_prod)
            .with_context(|| format!("Invalid frontend origin: {frontend_prod}"))?;
        exact.push(frontend_prod.to_string());
    }
    let preview = Regex::new(r"(?i)^https://([a-z0-9-]+\.)+vercel\.app$")
        .context("Failed to compile preview origin pattern")?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| exact.iter().any(|o| o == origin) || preview.is_match(origin))
        }))
        .allow_credentials(true)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .expose_headers([SET_COOKIE])
        .max_age(CORS_MAX_AGE))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
