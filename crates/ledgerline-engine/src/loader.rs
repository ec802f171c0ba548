//! Replace-load of exported artifacts into the warehouse.
//!
//! Artifacts are processed one at a time, sorted by table name. Each
//! artifact is dropped, recreated and copied inside one warehouse
//! transaction. The first failure rolls back that artifact and aborts the
//! rest of the run.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use ledgerline_state::StateBackend;
use ledgerline_types::state::{PipelineId, RunPhase};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::PipelineError;
use crate::history::RunTracker;
use crate::staging::ARTIFACT_EXTENSION;
use crate::warehouse::Warehouse;

/// One artifact found in the data directory. The target table is the
/// file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub table: String,
    pub path: PathBuf,
}

/// List `*.parquet` artifacts in `data_dir`, sorted by table name.
/// A missing directory yields no artifacts.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] if the directory exists but
/// cannot be listed.
pub fn discover(data_dir: &Path) -> Result<Vec<Artifact>, PipelineError> {
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %data_dir.display(), "Data directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(PipelineError::Configuration(format!(
                "cannot list data directory {}: {e}",
                data_dir.display()
            )))
        }
    };

    let mut artifacts: Vec<Artifact> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
        })
        .filter_map(|path| {
            let table = path.file_stem()?.to_str()?.to_string();
            Some(Artifact { table, path })
        })
        .collect();
    artifacts.sort_by(|a, b| a.table.cmp(&b.table));
    Ok(artifacts)
}

/// Rows written for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub table: String,
    pub rows: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub tables: Vec<LoadedTable>,
    pub duration: Duration,
}

impl LoadSummary {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Drives replace-loads against a [`Warehouse`].
pub struct Loader<'a> {
    pipeline: PipelineId,
    state: Option<&'a dyn StateBackend>,
}

impl<'a> Loader<'a> {
    #[must_use]
    pub fn new(pipeline: PipelineId) -> Self {
        Self {
            pipeline,
            state: None,
        }
    }

    /// Record a `load` run per artifact in `state`.
    #[must_use]
    pub fn with_state(mut self, state: &'a dyn StateBackend) -> Self {
        self.state = Some(state);
        self
    }

    /// Load every artifact in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Connection`] if the target schema cannot be
    /// prepared, or the first [`PipelineError::LoadFailed`].
    pub async fn load_all<W: Warehouse>(
        &self,
        warehouse: &mut W,
        artifacts: &[Artifact],
    ) -> Result<LoadSummary, PipelineError> {
        let started = Instant::now();
        warehouse
            .ensure_schema()
            .await
            .map_err(|source| PipelineError::Connection {
                target: "warehouse".into(),
                source,
            })?;

        let mut summary = LoadSummary::default();
        for artifact in artifacts {
            let tracker = RunTracker::start(self.state, &self.pipeline, &artifact.table, RunPhase::Load)?;
            match self.load_artifact(warehouse, artifact).await {
                Ok(rows) => {
                    tracker.complete(rows, 1)?;
                    summary.tables.push(LoadedTable {
                        table: artifact.table.clone(),
                        rows,
                    });
                }
                Err(err) => {
                    tracker.fail(&err);
                    tracing::error!(
                        table = %artifact.table,
                        remaining = artifacts.len() - summary.tables.len() - 1,
                        error = %err,
                        "Load failed, aborting remaining artifacts"
                    );
                    return Err(err);
                }
            }
        }
        summary.duration = started.elapsed();
        Ok(summary)
    }

    /// Replace one target table with the artifact's content.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LoadFailed`] if the artifact cannot be read
    /// or any warehouse step fails. The transaction is rolled back first.
    pub async fn load_artifact<W: Warehouse>(
        &self,
        warehouse: &mut W,
        artifact: &Artifact,
    ) -> Result<u64, PipelineError> {
        let table = artifact.table.as_str();
        let file = File::open(&artifact.path)
            .with_context(|| format!("cannot open {}", artifact.path.display()))
            .map_err(|e| PipelineError::load(table, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("cannot read parquet metadata")
            .map_err(|e| PipelineError::load(table, e))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .context("cannot build parquet reader")
            .map_err(|e| PipelineError::load(table, e))?;

        tracing::info!(
            table,
            path = %artifact.path.display(),
            columns = schema.fields().len(),
            "Loading artifact"
        );

        warehouse
            .begin()
            .await
            .map_err(|e| PipelineError::load(table, e))?;

        let result: anyhow::Result<u64> = async {
            warehouse.drop_table(table).await?;
            warehouse.create_table(table, &schema).await?;
            let mut rows = 0u64;
            for batch in reader {
                let batch = batch.context("cannot decode parquet batch")?;
                rows += warehouse.copy_batch(table, &batch).await?;
            }
            warehouse.commit().await?;
            Ok(rows)
        }
        .await;

        match result {
            Ok(rows) => {
                tracing::info!(table, rows, "Loaded table");
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback_err) = warehouse.rollback().await {
                    tracing::warn!(table, error = %rollback_err, "ROLLBACK failed");
                }
                Err(PipelineError::load(table, e))
            }
        }
    }
}
