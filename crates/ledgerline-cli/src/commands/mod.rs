pub mod check;
pub mod clean;
pub mod extract;
pub mod load;
pub mod plan;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use ledgerline_engine::config::{parse_pipeline, validate_pipeline, PipelineConfig};
use ledgerline_engine::{
    discover, Extractor, LoadSummary, Loader, Orchestrator, PgSource, PgWarehouse, PipelineError,
    RunSummary, TableJob,
};
use ledgerline_state::SqliteStateBackend;

/// Parse and validate a pipeline file.
pub(crate) fn load_config(pipeline_path: &Path) -> Result<PipelineConfig> {
    let config = parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;
    validate_pipeline(&config)?;

    tracing::info!(
        pipeline = config.pipeline,
        tables = config.tables.len(),
        "Pipeline validated"
    );
    Ok(config)
}

/// Open the run-history database when the pipeline configures one.
pub(crate) fn open_state(config: &PipelineConfig) -> Result<Option<SqliteStateBackend>> {
    config
        .state
        .as_ref()
        .map(|state| {
            SqliteStateBackend::open(&state.path)
                .with_context(|| format!("Failed to open state database: {}", state.path.display()))
        })
        .transpose()
}

/// Extract the selected tables (all when `only` is empty) into artifacts.
pub(crate) async fn extract_tables(
    config: &PipelineConfig,
    state: Option<&SqliteStateBackend>,
    only: &[String],
) -> Result<RunSummary> {
    let jobs = config.table_jobs(only)?;
    let store = config.staging_store()?;
    let extractor = Extractor::new(config.retry_policy());

    let mut orchestrator = Orchestrator::new(config.pipeline_id(), extractor, store);
    if let Some(state) = state {
        orchestrator = orchestrator.with_state(state);
    }

    let options = config.source_options();
    let summary = orchestrator
        .extract_all(&jobs, |job: &TableJob| {
            let database = job.database.clone();
            let options = &options;
            async move { PgSource::connect(options, &database).await }
        })
        .await?;
    Ok(summary)
}

/// Replace-load every artifact in the data directory.
pub(crate) async fn load_artifacts(
    config: &PipelineConfig,
    state: Option<&SqliteStateBackend>,
) -> Result<LoadSummary> {
    let artifacts = discover(&config.paths.data_dir)?;
    if artifacts.is_empty() {
        tracing::warn!(
            data_dir = %config.paths.data_dir.display(),
            "No artifacts to load"
        );
    }

    let options = config.warehouse_options();
    let mut warehouse = PgWarehouse::connect(&options)
        .await
        .map_err(|source| PipelineError::Connection {
            target: format!("warehouse {}:{}/{}", options.host, options.port, options.database),
            source,
        })?;

    let mut loader = Loader::new(config.pipeline_id());
    if let Some(state) = state {
        loader = loader.with_state(state);
    }
    Ok(loader.load_all(&mut warehouse, &artifacts).await?)
}

pub(crate) fn print_extract_summary(pipeline: &str, summary: &RunSummary) {
    println!("Pipeline '{pipeline}' extraction completed.");
    for outcome in &summary.tables {
        println!(
            "  {:24} {:>10} rows  {:>4} chunk(s)  {:.2}s  -> {}",
            outcome.table,
            outcome.rows,
            outcome.chunks,
            outcome.duration.as_secs_f64(),
            outcome.artifact.path.display(),
        );
    }
    println!("  Tables:          {}", summary.tables.len());
    println!("  Rows extracted:  {}", summary.total_rows());
    println!("  Duration:        {:.2}s", summary.duration.as_secs_f64());
}

pub(crate) fn print_load_summary(pipeline: &str, summary: &LoadSummary) {
    println!("Pipeline '{pipeline}' load completed.");
    for table in &summary.tables {
        println!("  {:24} {:>10} rows", table.table, table.rows);
    }
    println!("  Tables:          {}", summary.tables.len());
    println!("  Rows loaded:     {}", summary.total_rows());
    println!("  Duration:        {:.2}s", summary.duration.as_secs_f64());
}
