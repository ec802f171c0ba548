//! Pipeline YAML configuration types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use ledgerline_types::state::PipelineId;
use ledgerline_types::SourceTypeId;
use serde::Deserialize;

use crate::extract::RetryPolicy;
use crate::orchestrator::{TableJob, WindowSpec};
use crate::source::SourceConnectOptions;
use crate::staging::StagingStore;
use crate::type_map::{SourceDialect, TargetType, TypeMap};
use crate::warehouse::WarehouseConnectOptions;

const DEFAULT_PG_PORT: u16 = 5432;

fn default_pg_port() -> u16 {
    DEFAULT_PG_PORT
}

fn default_source_timeout_secs() -> u64 {
    300
}

fn default_warehouse_timeout_secs() -> u64 {
    30
}

fn default_schema() -> String {
    "public".to_string()
}

/// Top-level pipeline configuration parsed from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub version: String,
    pub pipeline: String,
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub state: Option<StateConfig>,
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Connect timeout and per-statement timeout.
    #[serde(default = "default_source_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub dialect: SourceDialect,
    /// Source type id -> target type name, e.g. `1700: "DECIMAL(18,4)"`.
    #[serde(default)]
    pub type_overrides: BTreeMap<i64, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_warehouse_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "PathsConfig::default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl PathsConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("./parquet2load")
    }

    fn default_temp_dir() -> PathBuf {
        PathBuf::from("./temp")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            temp_dir: Self::default_temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Total attempts per chunk.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub pause_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_attempts,
            retry_delay_secs: policy.initial_delay.as_secs(),
            pause_secs: policy.pause.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    pub path: PathBuf,
}

/// One table to extract.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Company display name, substituted for `{company}` in the query.
    pub name: String,
    pub table: String,
    pub database: String,
    #[serde(default)]
    pub query: Option<String>,
    /// Relative paths are resolved against the pipeline file's directory.
    #[serde(default)]
    pub query_file: Option<PathBuf>,
    #[serde(default)]
    pub window: Option<WindowConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_per_page: i64,
}

impl TableConfig {
    /// Query text with `{database}` and `{company}` filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `query` nor `query_file` is set or the
    /// query file cannot be read.
    pub fn render_query(&self) -> Result<String> {
        let template = match (&self.query, &self.query_file) {
            (Some(query), _) => query.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read query file: {}", path.display()))?,
            (None, None) => anyhow::bail!("table '{}' has no query", self.table),
        };
        Ok(template
            .replace("{database}", &self.database)
            .replace("{company}", &self.name))
    }

    /// Build the extraction job for this table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be rendered.
    pub fn to_job(&self) -> Result<TableJob> {
        Ok(TableJob {
            name: self.name.clone(),
            table: self.table.clone(),
            database: self.database.clone(),
            query: self.render_query()?,
            window: self.window.map(|w| WindowSpec {
                start_date: w.start_date,
                end_date: w.end_date,
                days_per_page: w.days_per_page,
            }),
        })
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn pipeline_id(&self) -> PipelineId {
        PipelineId::new(&self.pipeline)
    }

    /// Make relative `query_file` paths relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        for table in &mut self.tables {
            if let Some(path) = table.query_file.as_mut() {
                if path.is_relative() {
                    *path = base_dir.join(&*path);
                }
            }
        }
    }

    /// Dialect table plus configured overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override names an unknown target type.
    pub fn type_map(&self) -> Result<TypeMap> {
        self.source
            .type_overrides
            .iter()
            .try_fold(TypeMap::for_dialect(self.source.dialect), |map, (id, ty)| {
                let target: TargetType = ty
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("type override for {id}: {e}"))?;
                Ok(map.with_override(SourceTypeId(*id), target))
            })
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.extract.max_retries,
            initial_delay: Duration::from_secs(self.extract.retry_delay_secs),
            pause: Duration::from_secs(self.extract.pause_secs),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the type map cannot be built.
    pub fn staging_store(&self) -> Result<StagingStore> {
        Ok(StagingStore::new(
            &self.paths.temp_dir,
            &self.paths.data_dir,
            self.type_map()?,
        ))
    }

    #[must_use]
    pub fn source_options(&self) -> SourceConnectOptions {
        SourceConnectOptions {
            host: self.source.host.clone(),
            port: self.source.port,
            user: self.source.user.clone(),
            password: self.source.password.clone(),
            timeout: Duration::from_secs(self.source.connect_timeout_secs),
        }
    }

    #[must_use]
    pub fn warehouse_options(&self) -> WarehouseConnectOptions {
        WarehouseConnectOptions {
            host: self.warehouse.host.clone(),
            port: self.warehouse.port,
            database: self.warehouse.database.clone(),
            user: self.warehouse.user.clone(),
            password: self.warehouse.password.clone(),
            schema: self.warehouse.schema.clone(),
            connect_timeout: Duration::from_secs(self.warehouse.connect_timeout_secs),
        }
    }

    /// Jobs for every table, or only those named in `only` when non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a requested table is not configured or a query
    /// cannot be rendered.
    pub fn table_jobs(&self, only: &[String]) -> Result<Vec<TableJob>> {
        for wanted in only {
            if !self.tables.iter().any(|t| &t.table == wanted) {
                anyhow::bail!("table '{wanted}' is not configured");
            }
        }
        self.tables
            .iter()
            .filter(|t| only.is_empty() || only.contains(&t.table))
            .map(TableConfig::to_job)
            .collect()
    }
}
