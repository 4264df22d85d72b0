use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub id: i32,
    pub date: NaiveDate,
    pub summary: String,
    pub recommendations: RecommendationEnvelope,
}

/// Stored in the `recommendations` JSONB column. The model output is not parsed, so the
/// envelope only wraps the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEnvelope {
    pub text: String,
}

impl RecommendationEnvelope {
    pub fn new(summary: &str) -> Self {
        Self {
            text: summary.to_string(),
        }
    }
}
