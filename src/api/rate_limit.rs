//! Fixed-window rate limiting for sensitive routes.
//!
//! Buckets are keyed by `(client ip, protected prefix)` and live in a
//! `DashMap`; holding the entry guard makes read-check-increment atomic per
//! key. Counting is per process and fixed-window, so a client can send up to
//! twice the nominal rate across a window boundary.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use super::error::ApiError;

pub const DEFAULT_PROTECTED_PATHS: &str = "/auth/login,/auth/register,/auth/forgot";
const UNKNOWN_CLIENT: &str = "unknown";

const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    window: Duration,
    max_requests: u32,
    protected_paths: Vec<String>,
    trust_forwarded: bool,
    sweep_interval: Option<Duration>,
}

impl RateLimitConfig {
    /// Defaults: 10 requests per 60 seconds on login, register and forgot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
            protected_paths: parse_paths(DEFAULT_PROTECTED_PATHS),
            trust_forwarded: false,
            sweep_interval: Some(Duration::from_secs(300)),
        }
    }

    #[must_use]
    pub fn with_window_seconds(mut self, seconds: u64) -> Self {
        self.window = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    #[must_use]
    pub fn with_protected_paths(mut self, paths: Vec<String>) -> Self {
        self.protected_paths = paths;
        self
    }

    #[must_use]
    pub fn with_trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    /// Zero disables the background sweeper.
    #[must_use]
    pub fn with_sweep_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval = (seconds > 0).then(|| Duration::from_secs(seconds));
        self
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    #[must_use]
    pub fn protected_paths(&self) -> &[String] {
        &self.protected_paths
    }

    #[must_use]
    pub fn trust_forwarded(&self) -> bool {
        self.trust_forwarded
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a comma separated path list, dropping blanks.
#[must_use]
pub fn parse_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Clone, Copy, Debug)]
struct Bucket {
    reset_at: Instant,
    count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// Path is not protected; no bucket was touched.
    Bypass,
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Limited {
        retry_after: u64,
    },
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    buckets: DashMap<(String, String), Bucket>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Protected prefix matching `path`, if any.
    #[must_use]
    pub fn protected_prefix(&self, path: &str) -> Option<&str> {
        self.config
            .protected_paths
            .iter()
            .map(String::as_str)
            .find(|prefix| path.starts_with(prefix))
    }

    /// Count one request from `ip` on `path` at `now`.
    pub fn check(&self, ip: &str, path: &str, now: Instant) -> RateDecision {
        let Some(prefix) = self.protected_prefix(path) else {
            return RateDecision::Bypass;
        };
        let window = self.config.window;
        let bucket = {
            let mut entry = self
                .buckets
                .entry((ip.to_string(), prefix.to_string()))
                .or_insert_with(|| Bucket {
                    reset_at: now + window,
                    count: 0,
                });
            if now > entry.reset_at {
                entry.reset_at = now + window;
                entry.count = 0;
            }
            entry.count = entry.count.saturating_add(1);
            *entry
        };

        let reset_after = bucket.reset_at.saturating_duration_since(now);
        if bucket.count > self.config.max_requests {
            return RateDecision::Limited {
                retry_after: ceil_seconds(reset_after).max(1),
            };
        }
        RateDecision::Allowed {
            limit: self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(bucket.count),
            reset_after,
        }
    }

    /// Drop buckets whose window has ended; returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| now <= bucket.reset_at);
        before.saturating_sub(self.buckets.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    let seconds = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Periodically prune expired buckets.
pub fn spawn_sweeper(limiter: Arc<FixedWindowLimiter>) -> Option<JoinHandle<()>> {
    let period = limiter.config().sweep_interval()?;
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep(Instant::now());
            if removed > 0 {
                debug!(removed, remaining = limiter.len(), "rate limit buckets swept");
            }
        }
    }))
}

/// Client address used as bucket key.
fn client_ip(request: &Request, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(
            || UNKNOWN_CLIENT.to_string(),
            |ConnectInfo(addr)| addr.ip().to_string(),
        )
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = first_forwarded {
        return Some(ip.to_string());
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Middleware applied before routing.
pub async fn enforce(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if limiter.protected_prefix(&path).is_none() {
        return next.run(request).await;
    }

    let ip = client_ip(&request, limiter.config().trust_forwarded());
    match limiter.check(&ip, &path, Instant::now()) {
        RateDecision::Bypass => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            warn!(client_ip = %ip, path = %path, retry_after, "rate limit exceeded");
            ApiError::RateLimited { retry_after }.into_response()
        }
        RateDecision::Allowed {
            limit,
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(HEADER_LIMIT, HeaderValue::from(limit));
            headers.insert(HEADER_REMAINING, HeaderValue::from(remaining));
            headers.insert(
                HEADER_RESET,
                HeaderValue::from(unix_now() + ceil_seconds(reset_after)),
            );
            response
        }
    }
}
