//! Rows of the `PostgREST` tables, shared by the store and the handlers.
//!
//! Column names are the Italian ones used by the database and by the
//! frontend; Rust field names are English and mapped with `serde(rename)`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Approval state of a profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Private person or company account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AccountKind {
    #[serde(rename = "privato")]
    Individual,
    #[serde(rename = "azienda")]
    Company,
}

impl AccountKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "privato",
            Self::Company => "azienda",
        }
    }
}

/// Row of `utenti`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "nome")]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "tipo")]
    pub kind: Option<AccountKind>,
    #[serde(default, rename = "codice_fiscale")]
    pub tax_code: Option<String>,
    #[serde(default, rename = "partita_iva")]
    pub vat_number: Option<String>,
    #[serde(default, rename = "ragione_sociale")]
    pub company_name: Option<String>,
    #[serde(default, rename = "stato")]
    pub status: Option<ApprovalStatus>,
    #[serde(default, rename = "motivo_rifiuto")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Profile {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Minimal profile written right after the identity user is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountSeed {
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub role: String,
    pub token_version: i64,
}

/// Profile submitted for approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub email: String,
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub username: Option<String>,
    #[serde(rename = "tipo")]
    pub kind: AccountKind,
    #[serde(rename = "codice_fiscale", skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
    #[serde(rename = "partita_iva", skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    #[serde(rename = "ragione_sociale", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(rename = "stato")]
    pub status: ApprovalStatus,
    pub is_active: bool,
    pub role: String,
}

/// Patch applied when an admin approves or rejects a profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionPatch {
    #[serde(rename = "stato")]
    pub status: ApprovalStatus,
    #[serde(rename = "motivo_rifiuto")]
    pub rejection_reason: Option<String>,
    pub approved_at: String,
    pub approved_by: String,
    pub is_active: bool,
}

/// Editable fields of a tenant (`locatari`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TenantInput {
    #[serde(rename = "nome")]
    pub first_name: String,
    #[serde(default, rename = "cognome")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "telefono")]
    pub phone: Option<String>,
    #[serde(default, rename = "note")]
    pub notes: Option<String>,
}

/// Row of `locatari`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Tenant {
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub details: TenantInput,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Listing parameters for tenants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantQuery {
    pub search: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// Editable fields of a review (`recensioni_locatari`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewInput {
    pub rating: u8,
    #[serde(default, rename = "commento")]
    pub comment: Option<String>,
}

/// Row of `recensioni_locatari`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "locatario_id")]
    pub tenant_id: String,
    pub rating: u8,
    #[serde(default, rename = "commento")]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn profile_reads_database_columns() -> Result<()> {
        let profile: Profile = serde_json::from_value(json!({
            "id": "u1",
            "nome": "Mario",
            "tipo": "azienda",
            "ragione_sociale": "ACME srl",
            "stato": "pending",
            "role": "admin",
        }))?;
        assert_eq!(profile.name.as_deref(), Some("Mario"));
        assert_eq!(profile.kind, Some(AccountKind::Company));
        assert_eq!(profile.status, Some(ApprovalStatus::Pending));
        assert!(profile.is_admin());
        Ok(())
    }

    #[test]
    fn tenant_flattens_details() -> Result<()> {
        let tenant: Tenant = serde_json::from_value(json!({
            "id": "t1",
            "user_id": "u1",
            "nome": "Luigi",
            "telefono": "+39 333",
        }))?;
        assert_eq!(tenant.details.first_name, "Luigi");
        assert_eq!(tenant.details.phone.as_deref(), Some("+39 333"));

        let value = serde_json::to_value(&tenant)?;
        assert_eq!(value.get("nome"), Some(&json!("Luigi")));
        assert_eq!(value.get("cognome"), Some(&serde_json::Value::Null));
        Ok(())
    }

    #[test]
    fn new_profile_omits_unused_identifiers() -> Result<()> {
        let profile = NewProfile {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: None,
            username: None,
            kind: AccountKind::Individual,
            tax_code: Some("RSSMRA80A01H501U".to_string()),
            vat_number: None,
            company_name: None,
            status: ApprovalStatus::Pending,
            is_active: true,
            role: "user".to_string(),
        };
        let value = serde_json::to_value(&profile)?;
        assert_eq!(value.get("tipo"), Some(&json!("privato")));
        assert_eq!(value.get("stato"), Some(&json!("pending")));
        assert!(value.get("partita_iva").is_none());
        Ok(())
    }
}
