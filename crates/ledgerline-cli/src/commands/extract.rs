use std::path::Path;

use anyhow::Result;

/// Execute the `extract` command: stage and export tables without loading.
pub async fn execute(pipeline_path: &Path, tables: &[String]) -> Result<()> {
    let config = super::load_config(pipeline_path)?;
    let state = super::open_state(&config)?;

    let summary = super::extract_tables(&config, state.as_ref(), tables).await?;
    super::print_extract_summary(&config.pipeline, &summary);
    Ok(())
}
