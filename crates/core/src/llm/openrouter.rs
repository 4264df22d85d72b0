use crate::config::{Settings, DEFAULT_OPENROUTER_MAX_TOKENS};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{GenerateInput, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";
const DEFAULT_REFERER: &str = "http://localhost";
const APP_TITLE: &str = "spendlens";

const SYSTEM_PROMPT: &str = "You are a helpful financial analyst.";

#[derive(Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    referer: String,
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("referer", &self.referer)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url = settings
            .openrouter_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .openrouter_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let referer = settings
            .openrouter_referer
            .clone()
            .unwrap_or_else(|| DEFAULT_REFERER.to_string());
        let max_tokens = settings.openrouter_max_tokens()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.openrouter_timeout()? {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
            referer,
        })
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .context("OPENAI_API_KEY is not a valid header value")?,
        );
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(&self.referer)
                .context("OPENROUTER_REFERER is not a valid header value")?,
        );
        headers.insert("X-Title", HeaderValue::from_static(APP_TITLE));
        Ok(headers)
    }

    fn request(&self, input: &GenerateInput) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: user_prompt(input),
                },
            ],
            max_tokens: self.max_tokens,
        }
    }

    async fn create_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> anyhow::Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(req)
            .send()
            .await
            .context("OpenRouter request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read OpenRouter response body")?;
        if !status.is_success() {
            return Err(
                LlmDiagnosticsError::new(Provider::OpenRouter, "http", format!("status={status}"))
                    .with_raw_output(&text)
                    .into(),
            );
        }

        decode_response(&text)
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenRouterClient {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    async fn generate_insights(&self, input: GenerateInput) -> anyhow::Result<String> {
        let req = self.request(&input);
        let res = self.create_completion(&req).await?;

        if let Some(usage) = &res.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        let text = response_text(res)?;
        tracing::info!(
            %input.as_of_date,
            model = %self.model,
            chars = text.len(),
            "received LLM summary"
        );
        Ok(text)
    }
}

fn user_prompt(input: &GenerateInput) -> String {
    format!(
        "You are a fintech analyst. Based on the following transaction data for {}, \
provide a short summary and 3 actionable recommendations to improve performance. \
Data:\n{}",
        input.as_of_date,
        input.payload_text()
    )
}

fn decode_response(text: &str) -> anyhow::Result<ChatCompletionResponse> {
    let raw_json = serde_json::from_str::<serde_json::Value>(text).map_err(|err| {
        LlmDiagnosticsError::new(Provider::OpenRouter, "decode", format!("invalid JSON: {err}"))
            .with_raw_output(text)
    })?;

    // Gateways sometimes answer 200 with an error object instead of choices.
    if let Some(message) = raw_json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return Err(LlmDiagnosticsError::new(Provider::OpenRouter, "provider", message)
            .with_raw_json(raw_json.clone())
            .into());
    }

    serde_json::from_value::<ChatCompletionResponse>(raw_json.clone()).map_err(|err| {
        LlmDiagnosticsError::new(Provider::OpenRouter, "decode", err.to_string())
            .with_raw_json(raw_json)
            .into()
    })
}

fn response_text(res: ChatCompletionResponse) -> anyhow::Result<String> {
    let choice = res.choices.into_iter().next().ok_or_else(|| {
        LlmDiagnosticsError::new(Provider::OpenRouter, "choices", "response has no choices")
    })?;

    let text = choice
        .message
        .content
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(LlmDiagnosticsError::new(
            Provider::OpenRouter,
            "content",
            format!(
                "first choice has no content (finish_reason={})",
                choice.finish_reason.as_deref().unwrap_or("-")
            ),
        )
        .into());
    }
    Ok(text)
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,

    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn client() -> OpenRouterClient {
        OpenRouterClient {
            http: reqwest::Client::new(),
            api_key: "sk-or-test".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_OPENROUTER_MAX_TOKENS,
            referer: DEFAULT_REFERER.to_string(),
        }
    }

    fn input() -> GenerateInput {
        GenerateInput {
            as_of_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            payload: json!({"transactions": [{"amount": 42.5, "name": "Coffee"}]}),
        }
    }

    #[test]
    fn request_has_system_persona_then_prompt() {
        let req = serde_json::to_value(client().request(&input())).unwrap();
        assert_eq!(req["model"], "openai/gpt-3.5-turbo");
        assert_eq!(req["max_tokens"], 300);
        assert_eq!(req["messages"][0]["role"], "system");
        assert_eq!(req["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(req["messages"][1]["role"], "user");

        let prompt = req["messages"][1]["content"].as_str().unwrap();
        assert!(prompt.contains("transaction data for 2026-10-19"));
        assert!(prompt.contains("\"name\": \"Coffee\""));
        assert!(prompt.contains("3 actionable recommendations"));
    }

    #[test]
    fn headers_carry_bearer_and_referer() {
        let headers = client().headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-or-test");
        assert_eq!(headers["HTTP-Referer"], "http://localhost");
        assert_eq!(headers["X-Title"], APP_TITLE);
    }

    #[test]
    fn returns_trimmed_first_choice() {
        let text = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "  Summary: fine.\n"}, "finish_reason": "stop"},
                {"message": {"role": "assistant", "content": "ignored"}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        })
        .to_string();

        let res = decode_response(&text).unwrap();
        assert_eq!(response_text(res).unwrap(), "Summary: fine.");
    }

    #[test]
    fn empty_choices_is_a_diagnostics_error() {
        let res = decode_response(r#"{"choices": []}"#).unwrap();
        let err = response_text(res).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "choices");
    }

    #[test]
    fn blank_content_is_rejected() {
        let res = decode_response(
            r#"{"choices": [{"message": {"content": "   "}, "finish_reason": "length"}]}"#,
        )
        .unwrap();
        let err = response_text(res).unwrap_err();
        assert!(err.to_string().contains("finish_reason=length"));
    }

    #[test]
    fn gateway_error_object_is_surfaced() {
        let err = decode_response(r#"{"error": {"message": "quota exceeded", "code": 402}}"#)
            .unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "provider");
        assert_eq!(diag.detail, "quota exceeded");
        assert!(diag.raw_response_json.is_some());
    }

    #[test]
    fn non_json_body_keeps_raw_output() {
        let err = decode_response("<html>bad gateway</html>").unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "decode");
        assert_eq!(diag.raw_output.as_deref(), Some("<html>bad gateway</html>"));
    }

    #[test]
    fn settings_drive_model_and_limits() {
        let settings = Settings::from_lookup(|key| {
            let value = match key {
                "OPENAI_API_KEY" => Some("sk-or-live"),
                "OPENROUTER_MODEL" => Some("anthropic/claude-3-haiku"),
                "OPENROUTER_MAX_TOKENS" => Some("512"),
                _ => None,
            };
            value.map(str::to_string)
        })
        .unwrap();

        let c = OpenRouterClient::from_settings(&settings).unwrap();
        let req = serde_json::to_value(c.request(&input())).unwrap();
        assert_eq!(req["model"], "anthropic/claude-3-haiku");
        assert_eq!(req["max_tokens"], 512);
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn debug_output_hides_api_key() {
        let out = format!("{:?}", client());
        assert!(!out.contains("sk-or-test"), "{out}");
        assert!(out.contains("openai/gpt-3.5-turbo"), "{out}");
    }
}
