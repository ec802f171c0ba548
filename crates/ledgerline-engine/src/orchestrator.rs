//! Per-table extraction pipeline: plan, extract, stage, export, release.
//!
//! Tables run one after another. Within a table windows run in ascending
//! order on a single source connection. The first unrecovered error aborts
//! the table and, through [`Orchestrator::extract_all`], the whole run.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ledgerline_state::StateBackend;
use ledgerline_types::state::{PipelineId, RunPhase};
use ledgerline_types::DateWindow;

use crate::error::PipelineError;
use crate::extract::Extractor;
use crate::history::RunTracker;
use crate::source::SourceClient;
use crate::staging::{ExportArtifact, StagingStore, StagingTable};
use crate::window::plan_windows;

/// Date range and page size of a windowed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_per_page: i64,
}

/// One table to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableJob {
    /// Display name of the source entity (company).
    pub name: String,
    /// Target table name; also names the staging file and artifact.
    pub table: String,
    /// Source database to connect to.
    pub database: String,
    /// Final query text. Windowed queries take `$1`/`$2` as the window bounds.
    pub query: String,
    pub window: Option<WindowSpec>,
}

impl TableJob {
    /// Windows to extract, in order. A static table yields a single `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for an invalid window spec.
    pub fn windows(&self) -> Result<Vec<Option<DateWindow>>, PipelineError> {
        match &self.window {
            Some(spec) => Ok(plan_windows(spec.start_date, spec.end_date, spec.days_per_page)?
                .into_iter()
                .map(Some)
                .collect()),
            None => Ok(vec![None]),
        }
    }
}

/// Result of one successfully extracted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: String,
    pub rows: u64,
    pub chunks: u32,
    pub artifact: ExportArtifact,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tables: Vec<TableOutcome>,
    pub duration: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

pub struct Orchestrator<'a> {
    pipeline: PipelineId,
    extractor: Extractor,
    store: StagingStore,
    state: Option<&'a dyn StateBackend>,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(pipeline: PipelineId, extractor: Extractor, store: StagingStore) -> Self {
        Self {
            pipeline,
            extractor,
            store,
            state: None,
        }
    }

    /// Record an `extract` run per table in `state`.
    #[must_use]
    pub fn with_state(mut self, state: &'a dyn StateBackend) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn store(&self) -> &StagingStore {
        &self.store
    }

    /// Extract every job, opening one scoped source connection per table.
    ///
    /// `connect` receives the job and returns a connection to its
    /// database. The connection is dropped as soon as the table finishes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Connection`] if a source cannot be reached,
    /// or the first table error. Tables after the failing one are skipped.
    pub async fn extract_all<S, F, Fut>(
        &self,
        jobs: &[TableJob],
        mut connect: F,
    ) -> Result<RunSummary, PipelineError>
    where
        S: SourceClient,
        F: FnMut(&TableJob) -> Fut,
        Fut: Future<Output = anyhow::Result<S>>,
    {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        for (idx, job) in jobs.iter().enumerate() {
            tracing::info!(
                table = %job.table,
                company = %job.name,
                database = %job.database,
                position = idx + 1,
                total = jobs.len(),
                "Processing table"
            );

            let mut source = connect(job).await.map_err(|source| {
                let err = PipelineError::Connection {
                    target: format!("source database '{}'", job.database),
                    source,
                };
                tracing::error!(table = %job.table, error = %err, "Source connection failed");
                err
            })?;

            let outcome = self.run_table(&mut source, job).await;
            drop(source);

            match outcome {
                Ok(outcome) => summary.tables.push(outcome),
                Err(err) => {
                    tracing::error!(
                        table = %job.table,
                        kind = err.kind(),
                        error = %err,
                        skipped = jobs.len() - idx - 1,
                        "Table failed, aborting run"
                    );
                    return Err(err);
                }
            }
        }

        summary.duration = started.elapsed();
        Ok(summary)
    }

    /// Extract one table through the staging store into its artifact.
    ///
    /// The staging file is released on every path, success or failure.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for a bad window spec,
    /// [`PipelineError::ExtractionFailed`] when a chunk exhausts its
    /// retries, [`PipelineError::SchemaMismatch`] when a chunk disagrees
    /// with the first one, or [`PipelineError::Staging`] for local I/O
    /// failures.
    pub async fn run_table<S: SourceClient>(
        &self,
        source: &mut S,
        job: &TableJob,
    ) -> Result<TableOutcome, PipelineError> {
        let started = Instant::now();
        let windows = job.windows()?;
        let tracker = RunTracker::start(self.state, &self.pipeline, &job.table, RunPhase::Extract)?;

        let result = self.stage_table(source, job, &windows).await;
        match result {
            Ok((artifact, chunks)) => {
                tracker.complete(artifact.rows, chunks)?;
                tracing::info!(
                    table = %job.table,
                    rows = artifact.rows,
                    chunks,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Table extracted"
                );
                Ok(TableOutcome {
                    table: job.table.clone(),
                    rows: artifact.rows,
                    chunks,
                    artifact,
                    duration: started.elapsed(),
                })
            }
            Err(err) => {
                tracker.fail(&err);
                Err(err)
            }
        }
    }

    async fn stage_table<S: SourceClient>(
        &self,
        source: &mut S,
        job: &TableJob,
        windows: &[Option<DateWindow>],
    ) -> Result<(ExportArtifact, u32), PipelineError> {
        let mut staging = self.store.acquire(&job.table)?;
        let outcome = self.fill(source, job, windows, &mut staging).await;
        let chunks = staging.chunks();
        let released = staging.release();
        let artifact = outcome?;
        released?;
        Ok((artifact, chunks))
    }

    async fn fill<S: SourceClient>(
        &self,
        source: &mut S,
        job: &TableJob,
        windows: &[Option<DateWindow>],
        staging: &mut StagingTable<'_>,
    ) -> Result<ExportArtifact, PipelineError> {
        for (idx, window) in windows.iter().enumerate() {
            let chunk = self
                .extractor
                .extract(source, &job.table, &job.query, window.as_ref())
                .await?;
            if idx == 0 {
                staging.create(&chunk)?;
            }
            staging.append(&chunk)?;
        }
        staging.export()
    }
}
