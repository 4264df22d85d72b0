use crate::domain::snapshot::RawTransactionSnapshot;
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;

/// Append-only log of fetched payloads.
#[async_trait::async_trait]
pub trait RawSnapshotStore: Send + Sync {
    async fn append(&self, payload: &Value, retrieved_date: NaiveDate) -> anyhow::Result<i32>;

    /// Most recent payload by retrieval date, newest insert first on ties.
    async fn latest(&self) -> anyhow::Result<Option<Value>>;
}

#[derive(Debug, Clone)]
pub struct PgRawSnapshotStore {
    pool: sqlx::PgPool,
}

impl PgRawSnapshotStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn latest_snapshot(&self) -> anyhow::Result<Option<RawTransactionSnapshot>> {
        let row = sqlx::query_as::<_, (i32, NaiveDate, Value)>(
            "SELECT id, retrieved_date, data \
             FROM transactions_raw \
             ORDER BY retrieved_date DESC, id DESC \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("select latest transactions_raw failed")?;

        Ok(row.map(|(id, retrieved_date, payload)| RawTransactionSnapshot {
            id,
            retrieved_date,
            payload,
        }))
    }
}

#[async_trait::async_trait]
impl RawSnapshotStore for PgRawSnapshotStore {
    async fn append(&self, payload: &Value, retrieved_date: NaiveDate) -> anyhow::Result<i32> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO transactions_raw (retrieved_date, data) \
             VALUES ($1, $2) \
             RETURNING id",
        )
        .bind(retrieved_date)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .context("insert transactions_raw failed")?;

        tracing::debug!(%retrieved_date, snapshot_id = id, "stored raw transactions");
        Ok(id)
    }

    async fn latest(&self) -> anyhow::Result<Option<Value>> {
        Ok(self.latest_snapshot().await?.map(|s| s.payload))
    }
}
