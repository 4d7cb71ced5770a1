//! Data store client (`PostgREST`).
//!
//! Every call uses the service-role key; ownership is enforced by always
//! filtering tenant rows on `user_id`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{Instrument, debug, info_span};

use super::models::{
    AccountSeed, DecisionPatch, NewProfile, Profile, Review, ReviewInput, Tenant, TenantInput,
    TenantQuery,
};
use super::{SupabaseConfig, error_message};

const PROFILES: &str = "utenti";
const TENANTS: &str = "locatari";
const REVIEWS: &str = "recensioni_locatari";

const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("data store unavailable: {0}")]
    Unavailable(String),
    #[error("conflicting row: {0}")]
    Conflict(String),
    #[error("data store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected data store response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    /// All profiles, newest first.
    async fn profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// Profiles waiting for a decision, oldest first.
    async fn pending_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// Insert or merge the base profile created at registration.
    async fn upsert_account(&self, seed: &AccountSeed) -> Result<(), StoreError>;

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError>;

    async fn decide(
        &self,
        user_id: &str,
        decision: &DecisionPatch,
    ) -> Result<Option<Profile>, StoreError>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create_tenant(&self, owner: &str, input: &TenantInput) -> Result<Tenant, StoreError>;

    async fn tenants(&self, owner: &str, query: &TenantQuery) -> Result<Vec<Tenant>, StoreError>;

    async fn tenant(&self, owner: &str, tenant_id: &str) -> Result<Option<Tenant>, StoreError>;

    async fn update_tenant(
        &self,
        owner: &str,
        tenant_id: &str,
        input: &TenantInput,
    ) -> Result<Option<Tenant>, StoreError>;

    async fn delete_tenant(&self, owner: &str, tenant_id: &str) -> Result<(), StoreError>;

    /// Reviews of one tenant, newest first.
    async fn reviews(&self, owner: &str, tenant_id: &str) -> Result<Vec<Review>, StoreError>;

    async fn create_review(
        &self,
        owner: &str,
        tenant_id: &str,
        input: &ReviewInput,
    ) -> Result<Review, StoreError>;
}

type Params = Vec<(&'static str, String)>;

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// `PostgREST` client over `reqwest`.
#[derive(Clone, Debug)]
pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    service_role_key: SecretString,
}

impl PostgrestStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            rest_url: format!("{}/rest/v1", config.url()),
            service_role_key: config.service_role_key().clone(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let key = self.service_role_key.expose_secret();
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &'static str,
        table: &str,
    ) -> Result<Response, StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgrest",
            db.operation = operation,
            db.table = table
        );
        let response = request
            .send()
            .instrument(span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = error_message(&response.text().await.unwrap_or_default());
        debug!("data store answered {status} on {operation} {table}");
        if status == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(message));
        }
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &Params,
    ) -> Result<Vec<T>, StoreError> {
        let request = self.request(Method::GET, table).query(params);
        let response = self.send(request, "SELECT", table).await?;
        decode(response).await
    }

    async fn insert<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        table: &str,
        body: &B,
        prefer: &str,
    ) -> Result<Vec<T>, StoreError> {
        let request = self
            .request(Method::POST, table)
            .header("Prefer", prefer)
            .json(body);
        let response = self.send(request, "INSERT", table).await?;
        decode(response).await
    }

    async fn update<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        table: &str,
        params: &Params,
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let request = self
            .request(Method::PATCH, table)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(params)
            .json(body);
        let response = self.send(request, "UPDATE", table).await?;
        decode(response).await
    }

    async fn delete(&self, table: &str, params: &Params) -> Result<(), StoreError> {
        let request = self.request(Method::DELETE, table).query(params);
        self.send(request, "DELETE", table).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StoreError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    // `Prefer: return=representation` answers with an array; single-object
    // answers show up when a proxy strips the header.
    match serde_json::from_slice::<Value>(&bytes)
        .map_err(|err| StoreError::Malformed(err.to_string()))?
    {
        Value::Array(rows) => rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(|err| StoreError::Malformed(err.to_string())))
            .collect(),
        row @ Value::Object(_) => serde_json::from_value(row)
            .map(|row| vec![row])
            .map_err(|err| StoreError::Malformed(err.to_string())),
        _ => Ok(Vec::new()),
    }
}

fn first<T>(rows: Vec<T>) -> Option<T> {
    rows.into_iter().next()
}

/// Serialize `body` and stamp ownership columns on it.
fn owned_row<B: Serialize>(body: &B, columns: &[(&str, &str)]) -> Result<Value, StoreError> {
    let mut value =
        serde_json::to_value(body).map_err(|err| StoreError::Malformed(err.to_string()))?;
    if let Value::Object(map) = &mut value {
        for (column, owner) in columns {
            map.insert((*column).to_string(), Value::String((*owner).to_string()));
        }
    }
    Ok(value)
}

/// Strip characters that carry meaning inside a `PostgREST` `or=(...)` filter.
pub(crate) fn sanitize_search(term: &str) -> Option<String> {
    let cleaned: String = term
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"' | '\\' | '%' | ':'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn search_filter(term: &str) -> String {
    format!(
        "(nome.ilike.*{term}*,cognome.ilike.*{term}*,email.ilike.*{term}*,telefono.ilike.*{term}*)"
    )
}

#[async_trait]
impl ProfileStore for PostgrestStore {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let params = vec![
            ("select", "*".to_string()),
            ("id", eq(user_id)),
            ("limit", "1".to_string()),
        ];
        self.select(PROFILES, &params).await.map(first)
    }

    async fn profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        self.select(PROFILES, &params).await
    }

    async fn pending_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let params = vec![
            ("select", "*".to_string()),
            ("stato", eq("pending")),
            ("order", "created_at.asc".to_string()),
        ];
        self.select(PROFILES, &params).await
    }

    async fn upsert_account(&self, seed: &AccountSeed) -> Result<(), StoreError> {
        let _: Vec<Value> = self.insert(PROFILES, seed, MERGE_DUPLICATES).await?;
        Ok(())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let rows = self
            .insert(PROFILES, profile, RETURN_REPRESENTATION)
            .await?;
        first(rows).ok_or_else(|| StoreError::Malformed("insert returned no rows".to_string()))
    }

    async fn decide(
        &self,
        user_id: &str,
        decision: &DecisionPatch,
    ) -> Result<Option<Profile>, StoreError> {
        let params = vec![("id", eq(user_id))];
        self.update(PROFILES, &params, decision).await.map(first)
    }
}

#[async_trait]
impl TenantStore for PostgrestStore {
    async fn create_tenant(&self, owner: &str, input: &TenantInput) -> Result<Tenant, StoreError> {
        let row = owned_row(input, &[("user_id", owner)])?;
        let rows = self.insert(TENANTS, &row, RETURN_REPRESENTATION).await?;
        first(rows).ok_or_else(|| StoreError::Malformed("insert returned no rows".to_string()))
    }

    async fn tenants(&self, owner: &str, query: &TenantQuery) -> Result<Vec<Tenant>, StoreError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", eq(owner)),
            ("order", "created_at.desc".to_string()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(term) = query.search.as_deref().and_then(sanitize_search) {
            params.push(("or", search_filter(&term)));
        }
        self.select(TENANTS, &params).await
    }

    async fn tenant(&self, owner: &str, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        let params = vec![
            ("select", "*".to_string()),
            ("user_id", eq(owner)),
            ("id", eq(tenant_id)),
            ("limit", "1".to_string()),
        ];
        self.select(TENANTS, &params).await.map(first)
    }

    async fn update_tenant(
        &self,
        owner: &str,
        tenant_id: &str,
        input: &TenantInput,
    ) -> Result<Option<Tenant>, StoreError> {
        let params = vec![("user_id", eq(owner)), ("id", eq(tenant_id))];
        self.update(TENANTS, &params, input).await.map(first)
    }

    async fn delete_tenant(&self, owner: &str, tenant_id: &str) -> Result<(), StoreError> {
        let params = vec![("user_id", eq(owner)), ("id", eq(tenant_id))];
        self.delete(TENANTS, &params).await
    }

    async fn reviews(&self, owner: &str, tenant_id: &str) -> Result<Vec<Review>, StoreError> {
        let params = vec![
            ("select", "*".to_string()),
            ("user_id", eq(owner)),
            ("locatario_id", eq(tenant_id)),
            ("order", "created_at.desc".to_string()),
        ];
        self.select(REVIEWS, &params).await
    }

    async fn create_review(
        &self,
        owner: &str,
        tenant_id: &str,
        input: &ReviewInput,
    ) -> Result<Review, StoreError> {
        let row = owned_row(input, &[("user_id", owner), ("locatario_id", tenant_id)])?;
        let rows = self.insert(REVIEWS, &row, RETURN_REPRESENTATION).await?;
        first(rows).ok_or_else(|| StoreError::Malformed("insert returned no rows".to_string()))
    }
}
