use crate::domain::snapshot::has_content;
use crate::error::PipelineError;
use crate::ingest::TransactionSource;
use crate::llm::{GenerateInput, LlmClient};
use crate::storage::raw_transactions::RawSnapshotStore;
use crate::storage::recommendations::RecommendationStore;
use chrono::NaiveDate;
use std::fmt;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fetching,
    RawPersisted,
    Generating,
    Complete,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::RawPersisted => "raw_persisted",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Success { date: NaiveDate, snapshot_id: i32 },
    /// Nothing to analyse in the latest snapshot. Not an error.
    NoData { snapshot_id: Option<i32> },
    Failed {
        stage: PipelineState,
        error: PipelineError,
    },
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn status_line(&self) -> String {
        match self {
            Self::Success { date, .. } => format!("LLM summary stored for date: {date}"),
            Self::NoData { .. } => "No transaction data found.".to_string(),
            Self::Failed { stage, error } => format!("Pipeline failed at {stage}: {error}"),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub retrieved_date: NaiveDate,
    /// Every state visited, starting at `Idle` and ending at `Complete` or `Failed`.
    pub trail: Vec<PipelineState>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn final_state(&self) -> PipelineState {
        self.trail.last().copied().unwrap_or(PipelineState::Idle)
    }
}

/// Fetch, store raw, generate, store recommendation. Each step runs only if the previous one
/// succeeded.
pub struct Pipeline<'a> {
    source: &'a dyn TransactionSource,
    raw_store: &'a dyn RawSnapshotStore,
    llm: &'a dyn LlmClient,
    recommendations: &'a dyn RecommendationStore,
}

type StepError = (PipelineState, PipelineError);

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn TransactionSource,
        raw_store: &'a dyn RawSnapshotStore,
        llm: &'a dyn LlmClient,
        recommendations: &'a dyn RecommendationStore,
    ) -> Self {
        Self {
            source,
            raw_store,
            llm,
            recommendations,
        }
    }

    /// `run_date` keys the recommendation and dates the prompt. `retrieved_date` stamps the raw
    /// snapshot and must be the clock date of the fetch, so `latest()` reads back what this run
    /// just stored even when `run_date` is a backfill.
    pub async fn run(&self, run_date: NaiveDate, retrieved_date: NaiveDate) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "pipeline_run",
            %run_id,
            %run_date,
            %retrieved_date,
            source = self.source.provider_name(),
            llm = ?self.llm.provider(),
        );

        let mut trail = vec![PipelineState::Idle];
        let outcome = async {
            match self.execute(run_date, retrieved_date, &mut trail).await {
                Ok(outcome) => {
                    trail.push(PipelineState::Complete);
                    tracing::info!(status = %outcome.status_line(), "pipeline run complete");
                    outcome
                }
                Err((stage, error)) => {
                    trail.push(PipelineState::Failed);
                    tracing::error!(%stage, kind = error.kind(), error = %error, "pipeline run failed");
                    RunOutcome::Failed { stage, error }
                }
            }
        }
        .instrument(span)
        .await;

        RunReport {
            run_id,
            run_date,
            retrieved_date,
            trail,
            outcome,
        }
    }

    async fn execute(
        &self,
        run_date: NaiveDate,
        retrieved_date: NaiveDate,
        trail: &mut Vec<PipelineState>,
    ) -> Result<RunOutcome, StepError> {
        trail.push(PipelineState::Fetching);
        let payload = self
            .source
            .fetch_transactions()
            .await
            .map_err(|e| (PipelineState::Fetching, PipelineError::Fetch(e)))?;

        let snapshot_id = self
            .raw_store
            .append(&payload, retrieved_date)
            .await
            .map_err(|e| (PipelineState::Fetching, PipelineError::Persistence(e)))?;
        trail.push(PipelineState::RawPersisted);
        tracing::info!(snapshot_id, "raw snapshot persisted");

        let latest = self
            .raw_store
            .latest()
            .await
            .map_err(|e| (PipelineState::RawPersisted, PipelineError::Persistence(e)))?;

        let Some(latest) = latest.filter(has_content) else {
            tracing::info!(snapshot_id, "latest snapshot is empty; skipping generation");
            return Ok(RunOutcome::NoData {
                snapshot_id: Some(snapshot_id),
            });
        };

        trail.push(PipelineState::Generating);
        let summary = self
            .llm
            .generate_insights(GenerateInput {
                as_of_date: run_date,
                payload: latest,
            })
            .await
            .map_err(|e| (PipelineState::Generating, PipelineError::Generation(e)))?;

        self.recommendations
            .upsert(run_date, &summary)
            .await
            .map_err(|e| (PipelineState::Generating, PipelineError::Persistence(e)))?;

        Ok(RunOutcome::Success {
            date: run_date,
            snapshot_id,
        })
    }
}
