use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PrivateRegistration {
    pub email: String,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub codice_fiscale: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompanyRegistration {
    pub email: String,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub partita_iva: String,
    pub ragione_sociale: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AdminDecision {
    pub azione: DecisionAction,
    #[serde(default)]
    pub motivo_rifiuto: Option<String>,
}
