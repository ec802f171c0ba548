//! State backend trait definition.
//!
//! [`StateBackend`] defines the storage contract for per-table run
//! history. Model types live in [`ledgerline_types::state`].

use ledgerline_types::state::{PipelineId, RunPhase, RunRecord, RunStats, RunStatus, TableName};

use crate::error;

/// Storage contract for run history.
///
/// Implementations must be `Send + Sync` so the engine can hold them
/// behind `&dyn StateBackend` or `Arc<dyn StateBackend>`.
pub trait StateBackend: Send + Sync {
    /// Record the start of a table run, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(
        &self,
        pipeline: &PipelineId,
        table: &TableName,
        phase: RunPhase,
    ) -> error::Result<i64>;

    /// Finalize a run with its status and stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;

    /// Most recent run for a (pipeline, table, phase) triple, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn last_run(
        &self,
        pipeline: &PipelineId,
        table: &TableName,
        phase: RunPhase,
    ) -> error::Result<Option<RunRecord>>;
}
