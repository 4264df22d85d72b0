use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct TransactionsSyncRequest<'a> {
    pub client_id: &'a str,
    pub secret: &'a str,
    pub access_token: &'a str,

    // Always a fresh sync: no cursor is stored between runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<&'a str>,

    pub count: u32,
    pub options: TransactionsSyncOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionsSyncOptions {
    pub include_personal_finance_category: bool,
}

/// The sync metadata we log. The payload itself is stored untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSummary {
    #[serde(default)]
    pub added: Vec<serde_json::Value>,
    #[serde(default)]
    pub modified: Vec<serde_json::Value>,
    #[serde(default)]
    pub removed: Vec<serde_json::Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaidErrorBody {
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub request_id: Option<String>,
}
