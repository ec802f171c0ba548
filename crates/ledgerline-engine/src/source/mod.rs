//! Source database connections.
//!
//! A [`SourceClient`] runs one query, optionally bound to a date window,
//! and returns column metadata plus decoded rows. Connections are scoped:
//! the orchestrator opens one per table and drops it when the table is
//! finished.

mod text_cast;
pub mod postgres;

use ledgerline_types::{ChunkResult, DateWindow};

pub use postgres::{PgSource, SourceConnectOptions};

/// One open connection to a source database.
#[allow(async_fn_in_trait)]
pub trait SourceClient {
    /// Run `query` and collect the full result.
    ///
    /// With a window the query is bound with `$1 = window.start` and
    /// `$2 = window.end`; without one it runs unparameterized.
    ///
    /// # Errors
    ///
    /// Returns the driver error for query, decode or transport failures.
    /// The extractor decides whether to retry.
    async fn fetch(
        &mut self,
        query: &str,
        window: Option<&DateWindow>,
    ) -> anyhow::Result<ChunkResult>;
}
