//! Chunked extraction, local staging and warehouse replace-load.

#![warn(clippy::pedantic)]

pub mod arrow_utils;
pub mod config;
pub mod error;
pub mod extract;
pub(crate) mod history;
pub mod loader;
pub mod orchestrator;
pub mod source;
pub mod staging;
pub mod type_map;
pub mod warehouse;
pub mod window;

pub use error::PipelineError;
pub use extract::{Extractor, RetryPolicy};
pub use loader::{discover, Artifact, LoadSummary, Loader};
pub use orchestrator::{Orchestrator, RunSummary, TableJob, TableOutcome, WindowSpec};
pub use source::{PgSource, SourceClient, SourceConnectOptions};
pub use staging::{ExportArtifact, StagingStore, StagingTable};
pub use type_map::{SourceDialect, TargetType, TypeMap};
pub use warehouse::{PgWarehouse, Warehouse, WarehouseConnectOptions};
pub use window::plan_windows;
