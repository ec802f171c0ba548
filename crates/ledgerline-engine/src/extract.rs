//! Chunk extraction with bounded retry and exponential backoff.

use std::time::Duration;

use ledgerline_types::{ChunkResult, DateWindow};

use crate::error::PipelineError;
use crate::source::SourceClient;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(5);

/// Retry and throttling schedule for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt; doubled after each further failure.
    pub initial_delay: Duration,
    /// Fixed pause after every successful fetch.
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_RETRY_DELAY,
            pause: DEFAULT_PAUSE,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, after `attempt` has failed:
    /// `initial_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

/// Runs one query for one window against a source connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor {
    policy: RetryPolicy,
}

impl Extractor {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one chunk. Windowed when `window` is set, static otherwise.
    ///
    /// Each failure with attempts left sleeps the current backoff and
    /// retries. A success sleeps the throttling pause before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ExtractionFailed`] carrying the last cause
    /// once every attempt has failed.
    pub async fn extract<S: SourceClient>(
        &self,
        source: &mut S,
        table: &str,
        query: &str,
        window: Option<&DateWindow>,
    ) -> Result<ChunkResult, PipelineError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let window_start = window.map(|w| w.start.to_string());
        let window_end = window.map(|w| w.end.to_string());
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tracing::info!(
                table,
                attempt,
                max_attempts,
                window_start = window_start.as_deref(),
                window_end = window_end.as_deref(),
                "Fetching chunk"
            );

            match source.fetch(query, window).await {
                Ok(chunk) => {
                    tracing::debug!(
                        table,
                        columns = ?chunk.column_names,
                        types = ?chunk.column_source_types,
                        "Chunk column metadata"
                    );
                    #[allow(clippy::cast_possible_truncation)]
                    let pause_ms = self.policy.pause.as_millis() as u64;
                    tracing::info!(
                        table,
                        rows = chunk.num_rows(),
                        pause_ms,
                        "Chunk fetched, pausing"
                    );
                    tokio::time::sleep(self.policy.pause).await;
                    return Ok(chunk);
                }
                Err(err) => {
                    if attempt < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        #[allow(clippy::cast_possible_truncation)]
                        let delay_ms = delay.as_millis() as u64;
                        tracing::warn!(
                            table,
                            attempt,
                            max_attempts,
                            delay_ms,
                            error = %format!("{err:#}"),
                            "Chunk fetch failed, will retry"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(
                            table,
                            attempt,
                            error = %format!("{err:#}"),
                            "Chunk fetch failed, retries exhausted"
                        );
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(PipelineError::ExtractionFailed {
            table: table.to_string(),
            attempts: max_attempts,
            source: last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt was made")),
        })
    }
}
