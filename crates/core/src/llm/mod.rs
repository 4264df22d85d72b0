pub mod error;
pub mod openrouter;

#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub as_of_date: chrono::NaiveDate,
    pub payload: serde_json::Value,
}

impl GenerateInput {
    /// Text rendering of the snapshot embedded in the prompt.
    pub fn payload_text(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenRouter,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Free-text summary and recommendations for one snapshot. Not deterministic.
    async fn generate_insights(&self, input: GenerateInput) -> anyhow::Result<String>;
}
