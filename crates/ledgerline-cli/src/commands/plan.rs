use std::path::Path;

use anyhow::Result;

/// Execute the `plan` command: print each table's extraction windows.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    let config = super::load_config(pipeline_path)?;

    for job in config.table_jobs(&[])? {
        let windows = job.windows()?;
        match job.window {
            None => println!("{} ({}): static, 1 query", job.table, job.database),
            Some(_) => {
                println!(
                    "{} ({}): {} window(s)",
                    job.table,
                    job.database,
                    windows.len()
                );
                for window in windows.iter().flatten() {
                    println!("  {window}  ({} day(s))", window.num_days());
                }
            }
        }
    }
    Ok(())
}
