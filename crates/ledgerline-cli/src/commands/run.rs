use std::path::Path;

use anyhow::Result;

/// Execute the `run` command: extract every table, then load the artifacts.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = super::load_config(pipeline_path)?;
    let state = super::open_state(&config)?;

    let extracted = super::extract_tables(&config, state.as_ref(), &[]).await?;
    super::print_extract_summary(&config.pipeline, &extracted);

    let loaded = super::load_artifacts(&config, state.as_ref()).await?;
    super::print_load_summary(&config.pipeline, &loaded);

    println!(
        "Pipeline '{}' completed successfully in {:.2}s.",
        config.pipeline,
        (extracted.duration + loaded.duration).as_secs_f64()
    );
    Ok(())
}
