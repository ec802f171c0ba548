//! Pipeline error model.
//!
//! Only source fetches are retried (inside the extractor). Every variant
//! here is terminal for whatever produced it: the table for extraction
//! and staging failures, the remaining artifacts for load failures, the
//! whole run for configuration and connection failures.

use ledgerline_state::StateError;

/// Categorized pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid window parameters or other bad configuration values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Source query kept failing after every allowed attempt.
    #[error("extraction failed for '{table}' after {attempts} attempt(s): {source}")]
    ExtractionFailed {
        table: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A chunk disagrees with the schema derived from the first chunk.
    #[error("schema mismatch for '{table}': staging table has {expected} column(s), chunk has {actual}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Could not acquire a source or warehouse connection.
    #[error("cannot connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// Drop/create/copy of one artifact into the warehouse failed.
    #[error("load failed for '{table}': {source}")]
    LoadFailed {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// Local staging or export I/O failed (file system, Arrow, Parquet).
    #[error("staging failed for '{table}': {source}")]
    Staging {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// Run-history bookkeeping failed.
    #[error(transparent)]
    State(#[from] StateError),
}

impl PipelineError {
    pub(crate) fn staging(table: &str, source: impl Into<anyhow::Error>) -> Self {
        Self::Staging {
            table: table.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn load(table: &str, source: impl Into<anyhow::Error>) -> Self {
        Self::LoadFailed {
            table: table.to_string(),
            source: source.into(),
        }
    }

    /// Short machine-friendly label, used in logs and run history.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::Connection { .. } => "connection",
            Self::LoadFailed { .. } => "load_failed",
            Self::Staging { .. } => "staging",
            Self::State(_) => "state",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_failed_keeps_cause() {
        let err = PipelineError::ExtractionFailed {
            table: "accounts_47_savvy".into(),
            attempts: 3,
            source: anyhow::anyhow!("connection reset by peer"),
        };
        let msg = err.to_string();
        assert!(msg.contains("accounts_47_savvy"));
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("connection reset by peer"));
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "connection reset by peer");
        assert_eq!(err.kind(), "extraction_failed");
    }

    #[test]
    fn schema_mismatch_reports_both_counts() {
        let err = PipelineError::SchemaMismatch {
            table: "t".into(),
            expected: 2,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 column(s)"));
        assert!(msg.contains("chunk has 3"));
    }

    #[test]
    fn state_error_is_transparent() {
        let err: PipelineError = StateError::LockPoisoned.into();
        assert_eq!(err.to_string(), "state backend lock poisoned");
        assert_eq!(err.kind(), "state");
    }

    #[test]
    fn helpers_build_expected_variants() {
        let err = PipelineError::load("t", std::io::Error::other("disk gone"));
        assert!(matches!(err, PipelineError::LoadFailed { .. }));
        let err = PipelineError::staging("t", anyhow::anyhow!("bad ipc"));
        assert!(matches!(err, PipelineError::Staging { .. }));
    }
}
