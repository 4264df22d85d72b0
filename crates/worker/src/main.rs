use anyhow::Context;
use clap::Parser;
use spendlens_core::config::Settings;
use spendlens_core::error::PipelineError;
use spendlens_core::ingest::plaid::PlaidClient;
use spendlens_core::llm::error::LlmDiagnosticsError;
use spendlens_core::llm::openrouter::OpenRouterClient;
use spendlens_core::pipeline::{Pipeline, RunOutcome, RunReport};
use spendlens_core::storage::memory::{MemoryRawSnapshotStore, MemoryRecommendationStore};
use spendlens_core::storage::raw_transactions::PgRawSnapshotStore;
use spendlens_core::storage::recommendations::PgRecommendationStore;
use spendlens_core::time::run_date::{clock_date, resolve_run_date};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "spendlens_worker")]
struct Args {
    /// Date the run is recorded under (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    run_date: Option<String>,

    /// Fetch and generate, but keep results in memory instead of writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = settings.validate_for_worker(args.dry_run) {
        let err = anyhow::Error::new(err).context("invalid configuration");
        sentry_anyhow::capture_anyhow(&err);
        return Err(err);
    }

    let now = chrono::Utc::now();
    let offset = settings.run_date_offset()?;
    let run_date = resolve_run_date(args.run_date.as_deref(), now, offset)?;
    let retrieved_date = clock_date(now, offset);

    let source = PlaidClient::from_settings(&settings)?;
    let llm = OpenRouterClient::from_settings(&settings)?;

    let report = if args.dry_run {
        let raw = MemoryRawSnapshotStore::new();
        let recommendations = MemoryRecommendationStore::new();
        let report = Pipeline::new(&source, &raw, &llm, &recommendations)
            .run(run_date, retrieved_date)
            .await;

        if let Some(record) = recommendations.get(run_date).await {
            println!("{}", record.summary);
        }
        tracing::info!(%run_date, dry_run = true, "nothing written to the database");
        report
    } else {
        let db_url = settings.require_database_url()?;

        // One connection for the whole run; every statement autocommits.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;

        spendlens_core::storage::migrate(&pool).await?;

        let raw = PgRawSnapshotStore::new(pool.clone());
        let recommendations = PgRecommendationStore::new(pool.clone());
        let report = Pipeline::new(&source, &raw, &llm, &recommendations)
            .run(run_date, retrieved_date)
            .await;

        pool.close().await;
        report
    };

    report_outcome(&report);
    Ok(())
}

/// Prints the single status line for the run. Failed runs still exit 0 so the scheduler simply
/// tries again on the next trigger. The pipeline has already logged the failure at error level,
/// which is also what reaches Sentry.
fn report_outcome(report: &RunReport) {
    println!("{}", report.outcome.status_line());

    match &report.outcome {
        RunOutcome::Success { date, snapshot_id } => {
            tracing::info!(run_id = %report.run_id, %date, snapshot_id, "recommendation stored");
        }
        RunOutcome::NoData { snapshot_id } => {
            tracing::info!(run_id = %report.run_id, ?snapshot_id, "no transaction data found");
        }
        RunOutcome::Failed { stage, error } => {
            if let PipelineError::Generation(inner) = error {
                if let Some(diag) = inner.downcast_ref::<LlmDiagnosticsError>() {
                    tracing::debug!(
                        stage = diag.stage,
                        raw_output = diag.raw_output.as_deref().unwrap_or(""),
                        raw_json = ?diag.raw_response_json,
                        "LLM diagnostics"
                    );
                }
            }
            tracing::info!(
                run_id = %report.run_id,
                %stage,
                kind = error.kind(),
                "run ended in failed state"
            );
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
