mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ledgerline",
    version,
    about = "Windowed ledger extraction and warehouse replace-load"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every table, then load the exported artifacts
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Extract tables into Parquet artifacts without loading
    Extract {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Only extract these tables (repeatable)
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },
    /// Load the artifacts found in the data directory
    Load {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Validate pipeline configuration and connectivity
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Print the date windows each table would be extracted in
    Plan {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Delete leftover files from the temp directory
    Clean {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Run { pipeline } => commands::run::execute(&pipeline).await,
        Commands::Extract { pipeline, tables } => {
            commands::extract::execute(&pipeline, &tables).await
        }
        Commands::Load { pipeline } => commands::load::execute(&pipeline).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline).await,
        Commands::Plan { pipeline } => commands::plan::execute(&pipeline),
        Commands::Clean { pipeline } => commands::clean::execute(&pipeline),
    };

    if let Err(err) = &result {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "ledgerline failed");
    }
    result
}
