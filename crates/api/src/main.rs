use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spendlens_core::domain::recommendation::RecommendationRecord;
use spendlens_core::domain::snapshot::RawTransactionSnapshot;
use spendlens_core::storage::raw_transactions::PgRawSnapshotStore;
use spendlens_core::storage::recommendations::PgRecommendationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = spendlens_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let stores = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match spendlens_core::storage::migrate(&pool).await {
                Ok(()) => Some(Stores::new(pool)),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState { stores });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations/latest", get(get_latest_recommendation))
        .route("/recommendations/:date", get(get_recommendation_by_date))
        .route("/snapshots/latest", get(get_latest_snapshot))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct Stores {
    raw: PgRawSnapshotStore,
    recommendations: PgRecommendationStore,
}

impl Stores {
    fn new(pool: sqlx::PgPool) -> Self {
        Self {
            raw: PgRawSnapshotStore::new(pool.clone()),
            recommendations: PgRecommendationStore::new(pool),
        }
    }
}

#[derive(Debug, Clone)]
struct AppState {
    stores: Option<Stores>,
}

impl AppState {
    fn stores(&self) -> Result<&Stores, StatusCode> {
        self.stores.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %e, "query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_latest_recommendation(
    State(state): State<AppState>,
) -> Result<Json<RecommendationRecord>, StatusCode> {
    let record = state
        .stores()?
        .recommendations
        .fetch_latest()
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(record))
}

async fn get_recommendation_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<RecommendationRecord>, StatusCode> {
    let stores = state.stores()?;

    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let record = stores
        .recommendations
        .fetch_by_date(date)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(record))
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<RawTransactionSnapshot>, StatusCode> {
    let snapshot = state
        .stores()?
        .raw
        .latest_snapshot()
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(snapshot))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &spendlens_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
