use std::path::Path;

use anyhow::Result;
use ledgerline_engine::staging;

/// Execute the `clean` command: empty the temp directory, keeping `.gitignore`.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    let config = super::load_config(pipeline_path)?;

    let report = staging::clean_dir(&config.paths.temp_dir)?;
    println!(
        "Removed {} file(s) from {}, skipped {}.",
        report.removed.len(),
        config.paths.temp_dir.display(),
        report.skipped.len()
    );
    Ok(())
}
