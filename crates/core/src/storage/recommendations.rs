use crate::domain::recommendation::{RecommendationEnvelope, RecommendationRecord};
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;

/// One record per calendar date; later writes for the same date win.
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn upsert(&self, date: NaiveDate, summary: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PgRecommendationStore {
    pool: sqlx::PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch_by_date(&self, date: NaiveDate) -> anyhow::Result<Option<RecommendationRecord>> {
        let row = sqlx::query_as::<_, (i32, NaiveDate, String, Value)>(
            "SELECT id, date, summary, recommendations \
             FROM recommendations \
             WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select recommendations for {date} failed"))?;

        row.map(into_record).transpose()
    }

    pub async fn fetch_latest(&self) -> anyhow::Result<Option<RecommendationRecord>> {
        let row = sqlx::query_as::<_, (i32, NaiveDate, String, Value)>(
            "SELECT id, date, summary, recommendations \
             FROM recommendations \
             ORDER BY date DESC \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("select latest recommendations failed")?;

        row.map(into_record).transpose()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgRecommendationStore {
    async fn upsert(&self, date: NaiveDate, summary: &str) -> anyhow::Result<()> {
        let envelope = serde_json::to_value(RecommendationEnvelope::new(summary))
            .context("serialize recommendations envelope failed")?;

        sqlx::query(
            "INSERT INTO recommendations (date, summary, recommendations) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (date) DO UPDATE \
               SET summary = EXCLUDED.summary, recommendations = EXCLUDED.recommendations",
        )
        .bind(date)
        .bind(summary)
        .bind(envelope)
        .execute(&self.pool)
        .await
        .context("upsert recommendations failed")?;

        Ok(())
    }
}

fn into_record(
    (id, date, summary, recommendations): (i32, NaiveDate, String, Value),
) -> anyhow::Result<RecommendationRecord> {
    let recommendations = serde_json::from_value::<RecommendationEnvelope>(recommendations)
        .with_context(|| format!("invalid recommendations envelope in DB for date={date}"))?;
    Ok(RecommendationRecord {
        id,
        date,
        summary,
        recommendations,
    })
}
