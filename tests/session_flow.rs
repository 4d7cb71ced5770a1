//! Session lifecycle through the full router: login, refresh rotation,
//! transparent refresh on `/auth/me`, logout and rate limiting.

mod common;

use affitti::api::{
    handlers::auth::{CookieSettings, DeploymentMode, SameSite},
    rate_limit::RateLimitConfig,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    ADMIN_TOKEN, ALICE_EMAIL, ALICE_ID, EXPIRED_RECOVERY_TOKEN, THROTTLED_EMAIL,
    UNSEARCHABLE_EMAIL, app, app_with, cookie_pair, json_body, json_request, login, send,
    set_cookies,
};
use serde_json::json;
use std::time::Duration;

fn get(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    Ok(builder.body(Body::empty())?)
}

fn post(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    Ok(builder.body(Body::empty())?)
}

#[tokio::test]
async fn login_sets_both_cookies_and_returns_tokens() -> Result<()> {
    let app = app()?;
    let response = login(&app.router).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    let access = cookies
        .iter()
        .find(|c| c.starts_with("access_token="))
        .context("access cookie")?;
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Path=/;") || access.ends_with("Path=/"));
    assert!(access.contains("Max-Age=900"));
    assert!(access.contains("Secure"));
    let refresh = cookies
        .iter()
        .find(|c| c.starts_with("refresh_token="))
        .context("refresh cookie")?;
    assert!(refresh.contains("Path=/auth"));
    assert!(refresh.contains("Max-Age=604800"));

    let body = json_body(response).await?;
    assert_eq!(body["access_token"], "access-1");
    assert_eq!(body["refresh_token"], "refresh-1");
    assert_eq!(body["token_type"], "bearer");
    Ok(())
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() -> Result<()> {
    let app = app()?;
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/auth/login",
            &json!({"email": ALICE_EMAIL, "password": "wrong password"}),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    let body = json_body(response).await?;
    assert_eq!(body["code"], 401);
    Ok(())
}

#[tokio::test]
async fn me_without_any_token_is_missing_token() -> Result<()> {
    let app = app()?;
    let response = send(&app.router, get("/auth/me", None)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["message"], "Missing token");
    Ok(())
}

#[tokio::test]
async fn refresh_without_token_is_missing_refresh_token() -> Result<()> {
    let app = app()?;
    let response = send(&app.router, post("/auth/refresh", None)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["message"], "Missing refresh token");
    Ok(())
}

#[tokio::test]
async fn me_with_access_cookie_returns_user() -> Result<()> {
    let app = app()?;
    let cookies = set_cookies(&login(&app.router).await?);
    let access = cookie_pair(&cookies, "access_token").context("access cookie")?;

    let response = send(&app.router, get("/auth/me", Some(&access))?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    let body = json_body(response).await?;
    assert_eq!(body["email"], ALICE_EMAIL);
    Ok(())
}

#[tokio::test]
async fn me_with_bearer_header_returns_user() -> Result<()> {
    let app = app()?;
    let request = Request::builder()
        .uri("/auth/me")
        .header(header::AUTHORIZATION, "Bearer access-7")
        .body(Body::empty())?;
    let response = send(&app.router, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn me_refreshes_transparently_from_refresh_cookie() -> Result<()> {
    let app = app()?;
    let cookies = set_cookies(&login(&app.router).await?);
    let refresh = cookie_pair(&cookies, "refresh_token").context("refresh cookie")?;

    let response = send(&app.router, get("/auth/me", Some(&refresh))?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let rotated = set_cookies(&response);
    assert_eq!(
        cookie_pair(&rotated, "access_token").as_deref(),
        Some("access_token=access-2")
    );
    assert_eq!(
        cookie_pair(&rotated, "refresh_token").as_deref(),
        Some("refresh_token=refresh-2")
    );
    let body = json_body(response).await?;
    assert_eq!(body["email"], ALICE_EMAIL);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_rejects_the_previous_token() -> Result<()> {
    let app = app()?;
    let cookies = set_cookies(&login(&app.router).await?);
    let first = cookie_pair(&cookies, "refresh_token").context("refresh cookie")?;

    let response = send(&app.router, post("/auth/refresh", Some(&first))?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = set_cookies(&response);
    assert_eq!(
        cookie_pair(&rotated, "refresh_token").as_deref(),
        Some("refresh_token=refresh-2")
    );

    let stale = send(&app.router, post("/auth/refresh", Some(&first))?).await?;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&stale).is_empty());
    Ok(())
}

#[tokio::test]
async fn refresh_accepts_legacy_body_token() -> Result<()> {
    let app = app()?;
    login(&app.router).await?;
    let response = send(
        &app.router,
        json_request("POST", "/auth/refresh", &json!({"refresh_token": "refresh-1"}))?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["access_token"], "access-2");
    Ok(())
}

#[tokio::test]
async fn logout_clears_cookies_and_session_is_gone() -> Result<()> {
    let app = app()?;
    login(&app.router).await?;

    let response = send(&app.router, post("/auth/logout", None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookies(&response);
    assert!(cleared.len() >= 2);
    assert!(cleared.iter().all(|cookie| cookie.contains("Max-Age=0")));
    assert_eq!(
        cookie_pair(&cleared, "access_token").as_deref(),
        Some("access_token=")
    );
    let body = json_body(response).await?;
    assert_eq!(body["ok"], true);
    assert!(body["ts"].is_i64());

    // The browser drops expired cookies, so the next call carries none.
    let me = send(&app.router, get("/auth/me", None)?).await?;
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn local_mode_relaxes_cookie_attributes() -> Result<()> {
    let app = app_with(
        DeploymentMode::Local,
        CookieSettings {
            secure: true,
            same_site: SameSite::None,
            domain: Some("example.com".to_string()),
            ..CookieSettings::default()
        },
        RateLimitConfig::new().with_sweep_seconds(0),
    )?;
    let cookies = set_cookies(&login(&app.router).await?);
    assert_eq!(cookies.len(), 2);
    for cookie in &cookies {
        assert!(!cookie.contains("Secure"), "{cookie}");
        assert!(cookie.contains("SameSite=Lax"), "{cookie}");
        assert!(!cookie.contains("Domain="), "{cookie}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn login_is_rate_limited_per_window() -> Result<()> {
    let app = app_with(
        DeploymentMode::Production,
        CookieSettings::default(),
        RateLimitConfig::new()
            .with_max_requests(3)
            .with_window_seconds(60)
            .with_sweep_seconds(0),
    )?;
    let attempt = || {
        json_request(
            "POST",
            "/auth/login",
            &json!({"email": ALICE_EMAIL, "password": "wrong password"}),
        )
    };

    for remaining in ["2", "1", "0"] {
        let response = send(&app.router, attempt()?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok()),
            Some(remaining)
        );
    }

    let limited = send(&app.router, attempt()?).await?;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .context("Retry-After header")?;
    assert!((1..=60).contains(&retry_after));
    let body = json_body(limited).await?;
    assert_eq!(body["code"], 429);

    // Unprotected paths are never counted.
    let ping = send(&app.router, get("/ping", None)?).await?;
    assert_eq!(ping.status(), StatusCode::OK);

    tokio::time::advance(Duration::from_secs(61)).await;
    let after_window = send(&app.router, attempt()?).await?;
    assert_eq!(after_window.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn responses_carry_a_request_id() -> Result<()> {
    let app = app()?;
    let response = send(&app.router, get("/health", None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .context("x-request-id")?;
    assert_eq!(request_id.len(), 26);

    let echoed = Request::builder()
        .uri("/ping")
        .header("x-request-id", "client-chosen")
        .body(Body::empty())?;
    let response = send(&app.router, echoed).await?;
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("client-chosen")
    );
    Ok(())
}

#[tokio::test]
async fn unknown_route_uses_error_envelope() -> Result<()> {
    let app = app()?;
    let response = send(&app.router, get("/nope", None)?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await?;
    assert_eq!(body, json!({"code": 404, "message": "Not Found"}));
    Ok(())
}

async fn preflight(router: &axum::Router, origin: &str) -> Result<axum::http::Response<Body>> {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/auth/login")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())?;
    send(router, request).await
}

fn allowed_origin(response: &axum::http::Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn cors_allows_preview_origins_with_credentials() -> Result<()> {
    let app = app()?;
    let response = preflight(&app.router, "https://feature-x.vercel.app").await?;
    assert_eq!(allowed_origin(&response), Some("https://feature-x.vercel.app"));
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );

    for origin in [
        "https://Feature-X.vercel.app",
        "https://feature-x.team-a.vercel.app",
        "http://localhost:3000",
        "https://trusty-rent.vercel.app",
    ] {
        let response = preflight(&app.router, origin).await?;
        assert_eq!(allowed_origin(&response), Some(origin), "{origin} rejected");
    }

    for origin in [
        "https://evil.example.com",
        "https://vercel.app",
        "https://feature-x.vercel.app.evil.com",
        "http://feature-x.vercel.app",
    ] {
        let response = preflight(&app.router, origin).await?;
        assert_eq!(allowed_origin(&response), None, "{origin} allowed");
    }
    Ok(())
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Result<Request<Body>> {
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, format!("Bearer {token}").parse()?);
    Ok(request)
}

#[tokio::test]
async fn forgot_reports_upstream_refusal() -> Result<()> {
    let app = app()?;
    let accepted = send(
        &app.router,
        json_request("POST", "/auth/forgot", &json!({"email": " Alice@Example.com "}))?,
    )
    .await?;
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(json_body(accepted).await?, json!({"ok": true}));

    let refused = send(
        &app.router,
        json_request("POST", "/auth/forgot", &json!({"email": THROTTLED_EMAIL}))?,
    )
    .await?;
    assert_eq!(refused.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(refused).await?["message"], "Email rate limit exceeded");
    Ok(())
}

#[tokio::test]
async fn reset_requires_a_recovery_bearer() -> Result<()> {
    let app = app()?;
    let body = json!({"new_password": "brand new secret"});

    let missing = send(&app.router, json_request("POST", "/auth/reset", &body)?).await?;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(missing).await?["message"], "Missing recovery token");

    let expired = send(
        &app.router,
        with_bearer(
            json_request("POST", "/auth/reset", &body)?,
            EXPIRED_RECOVERY_TOKEN,
        )?,
    )
    .await?;
    assert_eq!(expired.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(expired).await?["message"],
        "Token has expired or is invalid"
    );

    let updated = send(
        &app.router,
        with_bearer(json_request("POST", "/auth/reset", &body)?, "recovery-1")?,
    )
    .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await?, json!({"ok": true}));
    Ok(())
}

#[tokio::test]
async fn admin_endpoints_reject_regular_users() -> Result<()> {
    let app = app()?;
    let lookup = Request::builder()
        .uri(format!("/auth/admin/lookup-user?email={ALICE_EMAIL}"))
        .body(Body::empty())?;
    let lookup = send(&app.router, with_bearer(lookup, "access-1")?).await?;
    assert_eq!(lookup.status(), StatusCode::FORBIDDEN);

    let set_password = json_request(
        "POST",
        "/auth/admin/set-password",
        &json!({"email": ALICE_EMAIL, "new_password": "brand new secret"}),
    )?;
    let set_password = send(&app.router, with_bearer(set_password, "access-1")?).await?;
    assert_eq!(set_password.status(), StatusCode::FORBIDDEN);
    assert!(app.identity.password_updates().is_empty());
    Ok(())
}

#[tokio::test]
async fn admin_lookup_reports_only_exact_matches() -> Result<()> {
    let app = app()?;
    let lookup = |email: &str| -> Result<Request<Body>> {
        let request = Request::builder()
            .uri(format!("/auth/admin/lookup-user?email={email}"))
            .body(Body::empty())?;
        with_bearer(request, ADMIN_TOKEN)
    };

    let known = send(&app.router, lookup(ALICE_EMAIL)?).await?;
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(
        json_body(known).await?,
        json!({"exists": true, "user_id": ALICE_ID})
    );

    let unknown = send(&app.router, lookup("ghost@example.com")?).await?;
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(
        json_body(unknown).await?,
        json!({"exists": false, "user_id": null})
    );

    let refused = send(&app.router, lookup(UNSEARCHABLE_EMAIL)?).await?;
    assert_eq!(refused.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(refused).await?["message"], "User not allowed");
    Ok(())
}

#[tokio::test]
async fn admin_set_password_targets_only_the_named_user() -> Result<()> {
    let app = app()?;
    let set_password = |email: &str| -> Result<Request<Body>> {
        with_bearer(
            json_request(
                "POST",
                "/auth/admin/set-password",
                &json!({"email": email, "new_password": "brand new secret"}),
            )?,
            ADMIN_TOKEN,
        )
    };

    let unknown = send(&app.router, set_password("ghost@example.com")?).await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(unknown).await?["message"], "User not found");
    assert!(app.identity.password_updates().is_empty());

    let refused = send(&app.router, set_password(UNSEARCHABLE_EMAIL)?).await?;
    assert_eq!(refused.status(), StatusCode::BAD_REQUEST);

    let replaced = send(&app.router, set_password(ALICE_EMAIL)?).await?;
    assert_eq!(replaced.status(), StatusCode::OK);
    assert_eq!(
        json_body(replaced).await?,
        json!({"ok": true, "user_id": ALICE_ID})
    );
    assert_eq!(app.identity.password_updates(), vec![ALICE_ID.to_string()]);
    Ok(())
}
