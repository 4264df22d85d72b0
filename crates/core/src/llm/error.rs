use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// A completion call that failed after reaching the provider, with whatever it sent back.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn new(provider: Provider, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            provider,
            stage,
            detail: detail.into(),
            raw_output: None,
            raw_response_json: None,
        }
    }

    pub fn with_raw_output(mut self, text: &str) -> Self {
        self.raw_response_json = serde_json::from_str::<Value>(text).ok();
        self.raw_output = Some(text.to_string());
        self
    }

    pub fn with_raw_json(mut self, json: Value) -> Self {
        self.raw_response_json = Some(json);
        self
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}
