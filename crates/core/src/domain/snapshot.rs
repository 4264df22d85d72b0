use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One stored `/transactions/sync` response, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransactionSnapshot {
    pub id: i32,
    pub retrieved_date: NaiveDate,
    pub payload: serde_json::Value,
}

/// Whether a payload carries anything worth analysing. `null` and `{}` do not.
pub fn has_content(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_documents_have_no_content() {
        assert!(!has_content(&json!(null)));
        assert!(!has_content(&json!({})));
        assert!(has_content(&json!({"added": []})));
        assert!(has_content(&json!({"transactions": [{"amount": 1.0}]})));
    }
}
