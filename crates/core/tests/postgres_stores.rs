//! Runs against a real Postgres when `TEST_DATABASE_URL` is set; otherwise each test is a no-op.

use chrono::NaiveDate;
use serde_json::json;
use spendlens_core::storage::raw_transactions::{PgRawSnapshotStore, RawSnapshotStore};
use spendlens_core::storage::recommendations::{PgRecommendationStore, RecommendationStore};

async fn test_pool() -> Option<sqlx::PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect TEST_DATABASE_URL failed");
    spendlens_core::storage::migrate(&pool)
        .await
        .expect("migrations failed");
    Some(pool)
}

#[tokio::test]
async fn raw_store_round_trips_latest_payload() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    // Far-future date so rows from real runs never sort ahead of ours.
    let date = NaiveDate::from_ymd_opt(9999, 12, 30).unwrap();
    let store = PgRawSnapshotStore::new(pool.clone());
    let payload = json!({
        "added": [{"amount": 42.5, "name": "Coffee", "personal_finance_category": {"primary": "FOOD_AND_DRINK"}}],
        "has_more": false,
        "next_cursor": "c-1"
    });

    let first = store.append(&json!({"older": true}), date).await.unwrap();
    let second = store.append(&payload, date).await.unwrap();
    assert!(second > first);

    assert_eq!(store.latest().await.unwrap(), Some(payload.clone()));
    let snapshot = store.latest_snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.id, second);
    assert_eq!(snapshot.retrieved_date, date);
    assert_eq!(snapshot.payload, payload);

    sqlx::query("DELETE FROM transactions_raw WHERE retrieved_date = $1")
        .bind(date)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn recommendation_upsert_keeps_one_row_per_date() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let date = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
    let store = PgRecommendationStore::new(pool.clone());

    store.upsert(date, "first").await.unwrap();
    let before = store.fetch_by_date(date).await.unwrap().unwrap();

    store.upsert(date, "second").await.unwrap();
    let after = store.fetch_by_date(date).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.summary, "second");
    assert_eq!(after.recommendations.text, "second");

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM recommendations WHERE date = $1")
        .bind(date)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let latest = store.fetch_latest().await.unwrap().unwrap();
    assert_eq!(latest.date, date);

    sqlx::query("DELETE FROM recommendations WHERE date = $1")
        .bind(date)
        .execute(&pool)
        .await
        .unwrap();
}
