use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use ledgerline_engine::{PgSource, PgWarehouse};

/// Execute the `check` command: validate pipeline config and connectivity.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = super::load_config(pipeline_path)?;
    println!("Pipeline structure: OK");

    let mut all_ok = true;

    let source = config.source_options();
    let databases: BTreeSet<&str> = config.tables.iter().map(|t| t.database.as_str()).collect();
    for database in databases {
        let label = format!("Source[{database}]:");
        match PgSource::connect(&source, database).await {
            Ok(_) => println!("{label:22} OK"),
            Err(err) => {
                all_ok = false;
                println!("{label:22} FAILED");
                println!("  {err:#}");
            }
        }
    }

    match PgWarehouse::connect(&config.warehouse_options()).await {
        Ok(_) => println!("{:22} OK", "Warehouse:"),
        Err(err) => {
            all_ok = false;
            println!("{:22} FAILED", "Warehouse:");
            println!("  {err:#}");
        }
    }

    if config.state.is_some() {
        match super::open_state(&config) {
            Ok(_) => println!("{:22} OK", "State backend:"),
            Err(err) => {
                all_ok = false;
                println!("{:22} FAILED", "State backend:");
                println!("  {err:#}");
            }
        }
    }

    if all_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
