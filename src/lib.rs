//! # Affitti (rental management API)
//!
//! `affitti` is the REST backend of a rental-management web application. It
//! delegates credential checks and token issuance to a Supabase identity
//! provider (`GoTrue`) and persists profiles, tenants and reviews through the
//! Supabase `PostgREST` data API.
//!
//! ## Sessions
//!
//! Login exchanges credentials for an access/refresh token pair. Both tokens
//! are handed to the browser as `HttpOnly` cookies; the server keeps no
//! session state. Access tokens are resolved from the `Authorization` header
//! first, then from the canonical cookie and a fixed list of legacy cookie
//! names. `/auth/me` transparently refreshes when only a refresh cookie is
//! present.
//!
//! ## Rate limiting
//!
//! Sensitive paths (login, register, forgot) are protected by an in-memory
//! fixed-window limiter keyed by client address and route prefix. Counting is
//! per instance and allows up to twice the nominal rate across a window
//! boundary.
//!
//! ## Approval workflow
//!
//! Profiles are created in `pending` state and must be approved by an admin
//! before the owner can read `/utenti/me`. Admins are notified by email when a
//! profile is submitted and users are notified of the decision.

pub mod api;
pub mod cli;
pub mod supabase;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
