//! Pipeline YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::PipelineConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Replace `${VAR_NAME}` with the variable's value.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.push(caps[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(result.into_owned())
}

/// Parse a pipeline YAML string (after env var substitution).
///
/// Relative `query_file` paths are left as written.
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_pipeline_str(yaml_str: &str) -> Result<PipelineConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: PipelineConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse pipeline YAML")?;
    Ok(config)
}

/// Parse a pipeline YAML file, resolving `query_file` paths against the
/// file's directory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_pipeline(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    let mut config = parse_pipeline_str(&content)
        .with_context(|| format!("Invalid pipeline file: {}", path.display()))?;
    if let Some(base_dir) = path.parent() {
        config.resolve_paths(base_dir);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version: "1.0"
pipeline: accounts
source:
  host: ${LL_TEST_SRC_HOST}
  user: etl
  password: ${LL_TEST_SRC_PASS}
warehouse:
  host: localhost
  database: dw
  user: loader
tables:
  - name: "SAVVY sp. z o.o."
    table: accounts_47_savvy
    database: e_5213836340
    query: "SELECT * FROM {database}.dbo.accounts WHERE company = '{company}'"
    window: { start_date: 2024-01-01, end_date: 2024-01-10, days_per_page: 5 }
"#;

    #[test]
    fn substitutes_env_vars() {
        std::env::set_var("LL_TEST_HOST", "myhost.example.com");
        let result = substitute_env_vars("host: ${LL_TEST_HOST}\nport: 5432").unwrap();
        assert_eq!(result, "host: myhost.example.com\nport: 5432");
        std::env::remove_var("LL_TEST_HOST");
    }

    #[test]
    fn no_env_vars_passthrough() {
        let input = "host: localhost\nport: 5432";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn every_missing_var_is_reported() {
        let err = substitute_env_vars("${LL_MISSING_X} and ${LL_MISSING_Y}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("LL_MISSING_X"));
        assert!(err.contains("LL_MISSING_Y"));
    }

    #[test]
    fn repeated_missing_var_is_reported_once() {
        let err = substitute_env_vars("${LL_MISSING_A} ${LL_MISSING_B} ${LL_MISSING_A}")
            .unwrap_err()
            .to_string();
        assert_eq!(
            err,
            "Missing environment variable(s): LL_MISSING_A, LL_MISSING_B"
        );
    }

    #[test]
    fn parses_minimal_pipeline_with_defaults() {
        std::env::set_var("LL_TEST_SRC_HOST", "mssql.internal");
        std::env::set_var("LL_TEST_SRC_PASS", "secret");
        let config = parse_pipeline_str(MINIMAL).unwrap();
        std::env::remove_var("LL_TEST_SRC_HOST");
        std::env::remove_var("LL_TEST_SRC_PASS");

        assert_eq!(config.pipeline, "accounts");
        assert_eq!(config.source.host, "mssql.internal");
        assert_eq!(config.source.password, "secret");
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.source.connect_timeout_secs, 300);
        assert_eq!(config.warehouse.schema, "public");
        assert_eq!(config.extract.max_retries, 3);
        assert_eq!(config.extract.retry_delay_secs, 30);
        assert_eq!(config.extract.pause_secs, 5);
        assert!(config.state.is_none());

        let job = config.tables[0].to_job().unwrap();
        assert_eq!(
            job.query,
            "SELECT * FROM e_5213836340.dbo.accounts WHERE company = 'SAVVY sp. z o.o.'"
        );
        assert_eq!(job.windows().unwrap().len(), 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "version: \"1.0\"\npipeline: p\nsurprise: true\n";
        assert!(parse_pipeline_str(yaml).is_err());
    }

    #[test]
    fn invalid_yaml_errors() {
        assert!(parse_pipeline_str("this is not: [valid: yaml: {{{}}}").is_err());
    }
}
