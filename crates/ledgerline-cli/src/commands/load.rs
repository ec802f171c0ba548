use std::path::Path;

use anyhow::Result;

/// Execute the `load` command: replace-load whatever the data directory holds.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = super::load_config(pipeline_path)?;
    let state = super::open_state(&config)?;

    let summary = super::load_artifacts(&config, state.as_ref()).await?;
    super::print_load_summary(&config.pipeline, &summary);
    Ok(())
}
