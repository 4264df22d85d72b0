use crate::config::{ConfigError, PlaidEnvironment, Settings, DEFAULT_PLAID_SYNC_COUNT};
use crate::ingest::types::{
    PlaidErrorBody, SyncSummary, TransactionsSyncOptions, TransactionsSyncRequest,
};
use crate::ingest::TransactionSource;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

const SYNC_PATH: &str = "/transactions/sync";
const BODY_EXCERPT_CHARS: usize = 512;

#[derive(Clone)]
pub struct PlaidCredentials {
    pub client_id: String,
    pub secret: String,
    pub access_token: String,
}

impl fmt::Debug for PlaidCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaidCredentials")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PlaidOptions {
    pub base_url: String,
    pub count: u32,
    pub include_personal_finance_category: bool,
    pub timeout: Option<Duration>,
}

impl PlaidOptions {
    pub fn for_environment(environment: PlaidEnvironment) -> Self {
        Self {
            base_url: environment.base_url().to_string(),
            count: DEFAULT_PLAID_SYNC_COUNT,
            include_personal_finance_category: true,
            timeout: None,
        }
    }

    pub fn from_settings(
        environment: PlaidEnvironment,
        settings: &Settings,
    ) -> Result<Self, ConfigError> {
        let mut out = Self::for_environment(environment);
        if let Some(url) = settings.plaid_base_url.as_deref() {
            out.base_url = url.to_string();
        }
        out.count = settings.plaid_sync_count()?;
        out.include_personal_finance_category = settings.plaid_include_pfc()?;
        out.timeout = settings.plaid_timeout()?;
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct PlaidClient {
    http: reqwest::Client,
    credentials: PlaidCredentials,
    options: PlaidOptions,
}

impl PlaidClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let environment = settings.require_plaid_env()?;
        let credentials = PlaidCredentials {
            client_id: settings.require_plaid_client_id()?.to_string(),
            secret: settings.require_plaid_secret()?.to_string(),
            access_token: settings.require_plaid_access_token()?.to_string(),
        };
        let options = PlaidOptions::from_settings(environment, settings)?;

        tracing::debug!(
            %environment,
            base_url = %options.base_url,
            count = options.count,
            "configured Plaid client"
        );

        Self::new(credentials, options)
    }

    pub fn new(credentials: PlaidCredentials, options: PlaidOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build Plaid http client")?;

        Ok(Self {
            http,
            credentials,
            options,
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.options.base_url.trim_end_matches('/'), SYNC_PATH)
    }

    fn request_body(&self) -> TransactionsSyncRequest<'_> {
        TransactionsSyncRequest {
            client_id: &self.credentials.client_id,
            secret: &self.credentials.secret,
            access_token: &self.credentials.access_token,
            cursor: None,
            count: self.options.count,
            options: TransactionsSyncOptions {
                include_personal_finance_category: self.options.include_personal_finance_category,
            },
        }
    }
}

#[async_trait::async_trait]
impl TransactionSource for PlaidClient {
    fn provider_name(&self) -> &'static str {
        "plaid"
    }

    async fn fetch_transactions(&self) -> Result<Value> {
        let res = self
            .http
            .post(self.url())
            .json(&self.request_body())
            .send()
            .await
            .context("Plaid transactions/sync request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Plaid response body")?;

        let payload = decode_sync_response(status, &text)?;
        log_sync_summary(&payload);
        Ok(payload)
    }
}

fn decode_sync_response(status: StatusCode, text: &str) -> Result<Value> {
    if !status.is_success() {
        if let Ok(body) = serde_json::from_str::<PlaidErrorBody>(text) {
            if !body.error_code.is_empty() {
                anyhow::bail!(
                    "Plaid HTTP {status}: {}/{}: {} (request_id={})",
                    body.error_type,
                    body.error_code,
                    body.error_message,
                    body.request_id.as_deref().unwrap_or("-")
                );
            }
        }
        anyhow::bail!("Plaid HTTP {status}: {}", body_excerpt(text));
    }

    let payload = serde_json::from_str::<Value>(text)
        .with_context(|| format!("Plaid response is not valid JSON: {}", body_excerpt(text)))?;
    anyhow::ensure!(
        payload.is_object(),
        "Plaid response must be a JSON object (got {payload})"
    );
    Ok(payload)
}

/// First few hundred characters of a response body, for error messages.
fn body_excerpt(text: &str) -> String {
    match text.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}... ({} bytes total)", &text[..cut], text.len()),
        None => text.to_string(),
    }
}

fn log_sync_summary(payload: &Value) {
    let summary = match serde_json::from_value::<SyncSummary>(payload.clone()) {
        Ok(s) => s,
        Err(err) => {
            tracing::debug!(error = %err, "Plaid response lacks the usual sync fields");
            return;
        }
    };

    tracing::info!(
        added = summary.added.len(),
        modified = summary.modified.len(),
        removed = summary.removed.len(),
        has_more = summary.has_more,
        has_cursor = summary.next_cursor.is_some(),
        "fetched Plaid transactions"
    );

    if summary.has_more {
        tracing::warn!("Plaid reported more pages; only the first page is stored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(options: PlaidOptions) -> PlaidClient {
        PlaidClient::new(
            PlaidCredentials {
                client_id: "client".to_string(),
                secret: "secret".to_string(),
                access_token: "access-sandbox-1".to_string(),
            },
            options,
        )
        .unwrap()
    }

    #[test]
    fn request_body_starts_a_fresh_sync() {
        let c = client(PlaidOptions::for_environment(PlaidEnvironment::Sandbox));
        let body = serde_json::to_value(c.request_body()).unwrap();
        assert_eq!(
            body,
            json!({
                "client_id": "client",
                "secret": "secret",
                "access_token": "access-sandbox-1",
                "count": 100,
                "options": {"include_personal_finance_category": true},
            })
        );
    }

    #[test]
    fn url_uses_environment_host() {
        let c = client(PlaidOptions::for_environment(PlaidEnvironment::Production));
        assert_eq!(c.url(), "https://production.plaid.com/transactions/sync");

        let mut opts = PlaidOptions::for_environment(PlaidEnvironment::Sandbox);
        opts.base_url = "http://127.0.0.1:8080/".to_string();
        assert_eq!(client(opts).url(), "http://127.0.0.1:8080/transactions/sync");
    }

    #[test]
    fn decodes_success_payload_verbatim() {
        let text = r#"{"added":[{"amount":42.5,"name":"Coffee"}],"modified":[],"removed":[],"has_more":false,"next_cursor":"abc"}"#;
        let v = decode_sync_response(StatusCode::OK, text).unwrap();
        assert_eq!(v["added"][0]["name"], "Coffee");
        assert_eq!(v["next_cursor"], "abc");
    }

    #[test]
    fn surfaces_plaid_error_fields() {
        let text = r#"{"error_type":"INVALID_INPUT","error_code":"INVALID_ACCESS_TOKEN","error_message":"provided access token is in an invalid format","request_id":"req-1"}"#;
        let err = decode_sync_response(StatusCode::BAD_REQUEST, text).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("INVALID_ACCESS_TOKEN"), "{msg}");
        assert!(msg.contains("req-1"), "{msg}");
    }

    #[test]
    fn rejects_non_json_and_non_object_bodies() {
        assert!(decode_sync_response(StatusCode::OK, "<html>").is_err());
        assert!(decode_sync_response(StatusCode::OK, "[1,2,3]").is_err());
        assert!(decode_sync_response(StatusCode::BAD_GATEWAY, "upstream down").is_err());
    }

    #[test]
    fn options_follow_settings() {
        let settings = Settings::from_lookup(|key| {
            let value = match key {
                "PLAID_BASE_URL" => Some("http://127.0.0.1:9000"),
                "PLAID_SYNC_COUNT" => Some("250"),
                "PLAID_INCLUDE_PFC" => Some("false"),
                "PLAID_TIMEOUT_SECS" => Some("15"),
                _ => None,
            };
            value.map(str::to_string)
        })
        .unwrap();

        let opts = PlaidOptions::from_settings(PlaidEnvironment::Sandbox, &settings).unwrap();
        assert_eq!(opts.base_url, "http://127.0.0.1:9000");
        assert_eq!(opts.count, 250);
        assert!(!opts.include_personal_finance_category);
        assert_eq!(opts.timeout, Some(Duration::from_secs(15)));

        let bad = Settings::from_lookup(|key| (key == "PLAID_SYNC_COUNT").then(|| "900".to_string()))
            .unwrap();
        assert!(PlaidOptions::from_settings(PlaidEnvironment::Sandbox, &bad).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let c = client(PlaidOptions::for_environment(PlaidEnvironment::Sandbox));
        let out = format!("{c:?}");
        assert!(out.contains("client"), "{out}");
        assert!(!out.contains("\"secret\""), "{out}");
        assert!(!out.contains("access-sandbox-1"), "{out}");
    }

    #[test]
    fn large_error_bodies_are_cut_short() {
        let page = format!("<html>{}</html>", "x".repeat(10_000));

        let msg = decode_sync_response(StatusCode::BAD_GATEWAY, &page)
            .unwrap_err()
            .to_string();
        assert!(msg.len() < 1_000, "{}", msg.len());
        assert!(msg.ends_with("(10013 bytes total)"), "{msg}");

        let msg = format!("{:#}", decode_sync_response(StatusCode::OK, &page).unwrap_err());
        assert!(msg.len() < 1_200, "{}", msg.len());

        assert_eq!(body_excerpt("upstream down"), "upstream down");
        let accented = body_excerpt(&"é".repeat(600));
        assert!(accented.starts_with(&"é".repeat(512)), "{accented}");
        assert!(accented.ends_with("... (1200 bytes total)"), "{accented}");
    }
}
