//! Process-local stores with the same semantics as the Postgres tables. Used for dry runs and
//! pipeline tests.

use crate::domain::recommendation::{RecommendationEnvelope, RecommendationRecord};
use crate::domain::snapshot::RawTransactionSnapshot;
use crate::storage::raw_transactions::RawSnapshotStore;
use crate::storage::recommendations::RecommendationStore;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryRawSnapshotStore {
    rows: Mutex<Vec<RawTransactionSnapshot>>,
}

impl MemoryRawSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshots(&self) -> Vec<RawTransactionSnapshot> {
        self.rows.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl RawSnapshotStore for MemoryRawSnapshotStore {
    async fn append(&self, payload: &Value, retrieved_date: NaiveDate) -> anyhow::Result<i32> {
        let mut rows = self.rows.lock().await;
        let id = rows.last().map(|r| r.id + 1).unwrap_or(1);
        rows.push(RawTransactionSnapshot {
            id,
            retrieved_date,
            payload: payload.clone(),
        });
        Ok(id)
    }

    async fn latest(&self) -> anyhow::Result<Option<Value>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .max_by_key(|r| (r.retrieved_date, r.id))
            .map(|r| r.payload.clone()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecommendationStore {
    inner: Mutex<MemoryRecommendations>,
}

#[derive(Debug, Default)]
struct MemoryRecommendations {
    next_id: i32,
    by_date: BTreeMap<NaiveDate, RecommendationRecord>,
}

impl MemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<RecommendationRecord> {
        self.inner.lock().await.by_date.values().cloned().collect()
    }

    pub async fn get(&self, date: NaiveDate) -> Option<RecommendationRecord> {
        self.inner.lock().await.by_date.get(&date).cloned()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryRecommendationStore {
    async fn upsert(&self, date: NaiveDate, summary: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let envelope = RecommendationEnvelope::new(summary);

        if let Some(existing) = inner.by_date.get_mut(&date) {
            existing.summary = summary.to_string();
            existing.recommendations = envelope;
            return Ok(());
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.by_date.insert(
            date,
            RecommendationRecord {
                id,
                date,
                summary: summary.to_string(),
                recommendations: envelope,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[tokio::test]
    async fn latest_round_trips_the_last_append() {
        let store = MemoryRawSnapshotStore::new();
        assert_eq!(store.latest().await.unwrap(), None);

        let payload = json!({"added": [{"amount": 12.0, "name": "Lunch"}], "has_more": false});
        store.append(&payload, day(19)).await.unwrap();
        assert_eq!(store.latest().await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn latest_orders_by_date_then_insertion() {
        let store = MemoryRawSnapshotStore::new();
        store.append(&json!({"n": 1}), day(19)).await.unwrap();
        store.append(&json!({"n": 2}), day(18)).await.unwrap();
        assert_eq!(store.latest().await.unwrap(), Some(json!({"n": 1})));

        let id = store.append(&json!({"n": 3}), day(19)).await.unwrap();
        assert_eq!(id, 3);
        assert_eq!(store.latest().await.unwrap(), Some(json!({"n": 3})));
    }

    #[tokio::test]
    async fn upsert_overwrites_in_place() {
        let store = MemoryRecommendationStore::new();
        store.upsert(day(19), "first").await.unwrap();
        let before = store.get(day(19)).await.unwrap();

        store.upsert(day(19), "second").await.unwrap();
        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, before.id);
        assert_eq!(records[0].summary, "second");
        assert_eq!(records[0].recommendations, RecommendationEnvelope::new("second"));

        store.upsert(day(20), "next day").await.unwrap();
        assert_eq!(store.records().await.len(), 2);
    }
}
