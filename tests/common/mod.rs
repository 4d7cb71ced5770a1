//! In-memory identity provider and stores for driving the full router.

#![allow(dead_code)]

use affitti::api::{
    self, Services,
    email::Notifier,
    handlers::auth::{AuthConfig, AuthState, CookieSettings, DeploymentMode},
    rate_limit::{FixedWindowLimiter, RateLimitConfig},
};
use affitti::supabase::{
    IdentityError, IdentityProvider, NewUser, ProfileStore, StoreError, TenantStore, TokenGrant,
    identity::AuthUser,
    models::{
        AccountSeed, DecisionPatch, NewProfile, Profile, Review, ReviewInput, Tenant, TenantInput,
        TenantQuery,
    },
};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header::SET_COOKIE},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceExt;

pub const ALICE_EMAIL: &str = "alice@example.com";
pub const ALICE_PASSWORD: &str = "correct horse";
pub const ALICE_ID: &str = "0b4c1f3e-7d55-4f7b-9a0e-3d1b2c4a5e6f";
pub const ADMIN_ID: &str = "9f8e7d6c-5b4a-4321-8fed-cba987654321";
pub const ADMIN_TOKEN: &str = "admin-token";
/// Recovery requests for this address are refused upstream.
pub const THROTTLED_EMAIL: &str = "throttled@example.com";
/// Admin searches for this address are refused upstream.
pub const UNSEARCHABLE_EMAIL: &str = "unsearchable@example.com";
pub const EXPIRED_RECOVERY_TOKEN: &str = "expired-recovery";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Issues `access-N` / `refresh-N` and only honours the latest refresh token.
#[derive(Default)]
pub struct RotatingIdentity {
    generation: Mutex<u32>,
    password_updates: Mutex<Vec<String>>,
}

impl RotatingIdentity {
    fn grant(&self) -> TokenGrant {
        let mut generation = lock(&self.generation);
        *generation += 1;
        TokenGrant {
            access_token: format!("access-{generation}"),
            refresh_token: Some(format!("refresh-{generation}")),
            expires_in: Some(3600),
        }
    }

    fn rejected(status: u16, message: &str) -> IdentityError {
        IdentityError::Rejected {
            status,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RotatingIdentity {
    async fn password_grant(&self, email: &str, password: &str) -> Result<TokenGrant, IdentityError> {
        if email == ALICE_EMAIL && password == ALICE_PASSWORD {
            Ok(self.grant())
        } else {
            Err(Self::rejected(400, "Invalid login credentials"))
        }
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError> {
        let current = format!("refresh-{}", *lock(&self.generation));
        if refresh_token == current {
            Ok(self.grant())
        } else {
            Err(Self::rejected(400, "Invalid Refresh Token: Already Used"))
        }
    }

    async fn current_user(&self, access_token: &str) -> Result<Value, IdentityError> {
        if access_token == ADMIN_TOKEN {
            return Ok(json!({"id": ADMIN_ID, "email": "admin@example.com"}));
        }
        if access_token.starts_with("access-") {
            return Ok(json!({"id": ALICE_ID, "email": ALICE_EMAIL}));
        }
        Err(Self::rejected(401, "invalid JWT"))
    }

    async fn update_password(&self, bearer_token: &str, _: &str) -> Result<(), IdentityError> {
        if bearer_token == EXPIRED_RECOVERY_TOKEN {
            return Err(Self::rejected(401, "Token has expired or is invalid"));
        }
        Ok(())
    }

    async fn recover(&self, email: &str, _: &str) -> Result<(), IdentityError> {
        if email == THROTTLED_EMAIL {
            return Err(Self::rejected(429, "Email rate limit exceeded"));
        }
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> Result<Option<String>, IdentityError> {
        if user.email == ALICE_EMAIL {
            return Err(Self::rejected(422, "A user with this email address has already been registered"));
        }
        Ok(Some(uuid::Uuid::new_v4().to_string()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, IdentityError> {
        if email == UNSEARCHABLE_EMAIL {
            return Err(Self::rejected(403, "User not allowed"));
        }
        Ok((email == ALICE_EMAIL).then(|| AuthUser {
            id: ALICE_ID.to_string(),
            email: Some(ALICE_EMAIL.to_string()),
        }))
    }

    async fn admin_update_password(&self, user_id: &str, _: &str) -> Result<(), IdentityError> {
        lock(&self.password_updates).push(user_id.to_string());
        Ok(())
    }
}

/// Profiles keyed by id, plus tenants and reviews keyed by their own ids.
#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, Profile>>,
    accounts: Mutex<Vec<AccountSeed>>,
    tenants: Mutex<Vec<Tenant>>,
    reviews: Mutex<Vec<Review>>,
}

impl MemoryStore {
    pub fn with_admin() -> Self {
        let store = Self::default();
        lock(&store.profiles).insert(
            ADMIN_ID.to_string(),
            Profile {
                id: Some(ADMIN_ID.to_string()),
                email: Some("admin@example.com".to_string()),
                role: Some("admin".to_string()),
                ..Profile::default()
            },
        );
        store
    }

    /// Rows seeded by `/auth/register`, in order.
    pub fn accounts(&self) -> Vec<AccountSeed> {
        lock(&self.accounts).clone()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(lock(&self.profiles).get(user_id).cloned())
    }

    async fn profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(lock(&self.profiles).values().cloned().collect())
    }

    async fn pending_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(lock(&self.profiles)
            .values()
            .filter(|profile| {
                profile.status == Some(affitti::supabase::models::ApprovalStatus::Pending)
            })
            .cloned()
            .collect())
    }

    async fn upsert_account(&self, seed: &AccountSeed) -> Result<(), StoreError> {
        lock(&self.accounts).push(seed.clone());
        Ok(())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let row: Profile = serde_json::to_value(profile)
            .and_then(serde_json::from_value)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        let mut profiles = lock(&self.profiles);
        if profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict("duplicate key".to_string()));
        }
        profiles.insert(profile.id.clone(), row.clone());
        Ok(row)
    }

    async fn decide(
        &self,
        user_id: &str,
        decision: &DecisionPatch,
    ) -> Result<Option<Profile>, StoreError> {
        let mut profiles = lock(&self.profiles);
        Ok(profiles.get_mut(user_id).map(|profile| {
            profile.status = Some(decision.status);
            profile.rejection_reason = decision.rejection_reason.clone();
            profile.approved_by = Some(decision.approved_by.clone());
            profile.approved_at = Some(decision.approved_at.clone());
            profile.is_active = Some(decision.is_active);
            profile.clone()
        }))
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn create_tenant(&self, owner: &str, input: &TenantInput) -> Result<Tenant, StoreError> {
        let tenant = Tenant {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: owner.to_string(),
            details: input.clone(),
            created_at: None,
        };
        lock(&self.tenants).push(tenant.clone());
        Ok(tenant)
    }

    async fn tenants(&self, owner: &str, query: &TenantQuery) -> Result<Vec<Tenant>, StoreError> {
        let needle = query.search.as_deref().map(str::to_lowercase);
        Ok(lock(&self.tenants)
            .iter()
            .rev()
            .filter(|tenant| tenant.user_id == owner)
            .filter(|tenant| {
                needle.as_deref().map_or(true, |needle| {
                    tenant.details.first_name.to_lowercase().contains(needle)
                })
            })
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn tenant(&self, owner: &str, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(lock(&self.tenants)
            .iter()
            .find(|tenant| tenant.user_id == owner && tenant.id == tenant_id)
            .cloned())
    }

    async fn update_tenant(
        &self,
        owner: &str,
        tenant_id: &str,
        input: &TenantInput,
    ) -> Result<Option<Tenant>, StoreError> {
        let mut tenants = lock(&self.tenants);
        Ok(tenants
            .iter_mut()
            .find(|tenant| tenant.user_id == owner && tenant.id == tenant_id)
            .map(|tenant| {
                tenant.details = input.clone();
                tenant.clone()
            }))
    }

    async fn delete_tenant(&self, owner: &str, tenant_id: &str) -> Result<(), StoreError> {
        lock(&self.tenants).retain(|tenant| !(tenant.user_id == owner && tenant.id == tenant_id));
        Ok(())
    }

    async fn reviews(&self, owner: &str, tenant_id: &str) -> Result<Vec<Review>, StoreError> {
        Ok(lock(&self.reviews)
            .iter()
            .rev()
            .filter(|review| review.user_id == owner && review.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create_review(
        &self,
        owner: &str,
        tenant_id: &str,
        input: &ReviewInput,
    ) -> Result<Review, StoreError> {
        let review = Review {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: owner.to_string(),
            tenant_id: tenant_id.to_string(),
            rating: input.rating,
            comment: input.comment.clone(),
            created_at: None,
        };
        lock(&self.reviews).push(review.clone());
        Ok(review)
    }
}

impl RotatingIdentity {
    /// User ids whose password an admin replaced, in order.
    pub fn password_updates(&self) -> Vec<String> {
        lock(&self.password_updates).clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub identity: Arc<RotatingIdentity>,
}

pub fn app_with(mode: DeploymentMode, cookies: CookieSettings, rate_limit: RateLimitConfig) -> Result<TestApp> {
    let rotating = Arc::new(RotatingIdentity::default());
    let identity: Arc<dyn IdentityProvider> = rotating.clone();
    let store = Arc::new(MemoryStore::with_admin());
    let profiles: Arc<dyn ProfileStore> = store.clone();
    let tenants: Arc<dyn TenantStore> = store.clone();
    let services = Services {
        auth: Arc::new(AuthState::new(AuthConfig::new(mode, cookies), identity)),
        profiles,
        tenants,
        notifier: Arc::new(Notifier::disabled()),
        limiter: Arc::new(FixedWindowLimiter::new(rate_limit)),
    };
    let router = api::app(&services, api::cors_layer("https://trusty-rent.vercel.app")?);
    Ok(TestApp {
        router,
        store,
        identity: rotating,
    })
}

pub fn app() -> Result<TestApp> {
    app_with(
        DeploymentMode::Production,
        CookieSettings {
            secure: true,
            ..CookieSettings::default()
        },
        RateLimitConfig::new().with_sweep_seconds(0),
    )
}

pub async fn send(router: &Router, request: Request<Body>) -> Result<Response<Body>> {
    Ok(router.clone().oneshot(request).await?)
}

pub async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

/// Raw `Set-Cookie` values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(ToString::to_string)
        .collect()
}

/// `name=value` of the first `Set-Cookie` for `name`.
pub fn cookie_pair(cookies: &[String], name: &str) -> Option<String> {
    cookies
        .iter()
        .filter_map(|cookie| cookie.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(ToString::to_string)
}

pub async fn login(router: &Router) -> Result<Response<Body>> {
    send(
        router,
        json_request(
            "POST",
            "/auth/login",
            &json!({"email": ALICE_EMAIL, "password": ALICE_PASSWORD}),
        )?,
    )
    .await
}
