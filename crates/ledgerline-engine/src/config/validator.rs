//! Semantic validation for parsed pipeline configuration values.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::config::types::{PipelineConfig, TableConfig};
use crate::type_map::TargetType;
use crate::window::plan_windows;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

fn validate_table(table: &TableConfig, idx: usize, errors: &mut Vec<String>) {
    let label = if table.table.trim().is_empty() {
        format!("Table {idx}")
    } else {
        format!("Table '{}'", table.table)
    };

    if table.table.trim().is_empty() {
        errors.push(format!("{label} has an empty table name"));
    } else if !IDENTIFIER_RE.is_match(&table.table) {
        errors.push(format!(
            "{label}: table name must match [A-Za-z_][A-Za-z0-9_]*"
        ));
    }
    if table.name.trim().is_empty() {
        errors.push(format!("{label} has an empty company name"));
    }
    if table.database.trim().is_empty() {
        errors.push(format!("{label} has an empty database"));
    }

    match (&table.query, &table.query_file) {
        (Some(_), Some(_)) => errors.push(format!("{label}: set either query or query_file, not both")),
        (None, None) => errors.push(format!("{label}: one of query or query_file is required")),
        (Some(q), None) if q.trim().is_empty() => errors.push(format!("{label}: query is empty")),
        _ => {}
    }

    if let Some(window) = &table.window {
        if let Err(e) = plan_windows(window.start_date, window.end_date, window.days_per_page) {
            errors.push(format!("{label}: {e}"));
        }
    }
}

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the pipeline config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipeline.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if config.source.host.trim().is_empty() {
        errors.push("Source host must not be empty".to_string());
    }
    if config.source.connect_timeout_secs == 0 {
        errors.push("Source connect_timeout_secs must be > 0".to_string());
    }
    for (id, ty) in &config.source.type_overrides {
        if let Err(e) = ty.parse::<TargetType>() {
            errors.push(format!("Type override for {id}: {e}"));
        }
    }

    if config.warehouse.host.trim().is_empty() {
        errors.push("Warehouse host must not be empty".to_string());
    }
    if config.warehouse.database.trim().is_empty() {
        errors.push("Warehouse database must not be empty".to_string());
    }
    if config.warehouse.schema.trim().is_empty() {
        errors.push("Warehouse schema must not be empty".to_string());
    }

    if config.extract.max_retries == 0 {
        errors.push("max_retries must be at least 1".to_string());
    }

    if config.tables.is_empty() {
        errors.push("At least one table must be configured".to_string());
    }

    let mut seen = HashSet::new();
    for (idx, table) in config.tables.iter().enumerate() {
        validate_table(table, idx, &mut errors);
        if !table.table.trim().is_empty() && !seen.insert(table.table.as_str()) {
            errors.push(format!("Duplicate table name '{}'", table.table));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "Pipeline validation failed:\n  - {}",
            errors.join("\n  - ")
        )
    }
}
