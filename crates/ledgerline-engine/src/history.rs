//! Optional run-history bookkeeping around one table's extract or load.

use ledgerline_state::StateBackend;
use ledgerline_types::state::{PipelineId, RunPhase, RunStats, RunStatus, TableName};

use crate::error::PipelineError;

/// An open `running` record, finished with [`RunTracker::complete`] or
/// [`RunTracker::fail`]. A no-op when no backend is configured.
pub(crate) struct RunTracker<'a> {
    state: Option<&'a dyn StateBackend>,
    run_id: i64,
}

impl<'a> RunTracker<'a> {
    pub(crate) fn start(
        state: Option<&'a dyn StateBackend>,
        pipeline: &PipelineId,
        table: &str,
        phase: RunPhase,
    ) -> Result<Self, PipelineError> {
        let run_id = match state {
            Some(backend) => backend.start_run(pipeline, &TableName::new(table), phase)?,
            None => 0,
        };
        Ok(Self { state, run_id })
    }

    pub(crate) fn complete(self, rows: u64, chunks: u32) -> Result<(), PipelineError> {
        if let Some(backend) = self.state {
            backend.complete_run(
                self.run_id,
                RunStatus::Completed,
                &RunStats {
                    rows,
                    chunks,
                    error_message: None,
                },
            )?;
        }
        Ok(())
    }

    /// Record the failure. Bookkeeping errors are logged, never returned,
    /// so they cannot mask `err`.
    pub(crate) fn fail(self, err: &PipelineError) {
        let Some(backend) = self.state else {
            return;
        };
        let stats = RunStats {
            rows: 0,
            chunks: 0,
            error_message: Some(err.to_string()),
        };
        if let Err(e) = backend.complete_run(self.run_id, RunStatus::Failed, &stats) {
            tracing::warn!(run_id = self.run_id, error = %e, "Failed to record run failure");
        }
    }
}
