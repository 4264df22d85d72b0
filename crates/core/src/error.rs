use crate::config::ConfigError;

/// Failure categories of a pipeline run. Component errors are `anyhow` chains; the step that
/// produced them decides the category.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("transaction fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),

    #[error("insight generation failed: {0:#}")]
    Generation(anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Fetch(_) => "fetch",
            Self::Persistence(_) => "persistence",
            Self::Generation(_) => "generation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn display_includes_context_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let err = PipelineError::Fetch(inner.context("Plaid request failed").unwrap_err());
        assert_eq!(
            err.to_string(),
            "transaction fetch failed: Plaid request failed: connection refused"
        );
        assert_eq!(err.kind(), "fetch");
    }

    #[test]
    fn config_errors_convert() {
        let err: PipelineError = ConfigError::Missing("PLAID_SECRET").into();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(err.to_string(), "configuration error: PLAID_SECRET is required");
    }
}
