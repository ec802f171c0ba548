//! `SQLite`-backed implementation of [`StateBackend`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use ledgerline_types::state::{PipelineId, RunPhase, RunRecord, RunStats, RunStatus, TableName};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS table_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    table_name TEXT NOT NULL,
    phase TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    rows INTEGER NOT NULL DEFAULT 0,
    chunks INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_table_runs_lookup ON table_runs (pipeline, table_name, phase);
";

/// `SQLite`-backed run history.
///
/// Create with [`SqliteStateBackend::open`] for file-backed persistence
/// or [`SqliteStateBackend::in_memory`] for tests.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

impl SqliteStateBackend {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    fn parse_phase(raw: &str) -> error::Result<RunPhase> {
        match raw {
            "extract" => Ok(RunPhase::Extract),
            "load" => Ok(RunPhase::Load),
            other => Err(StateError::Corrupt(format!("unknown phase '{other}'"))),
        }
    }
}

impl StateBackend for SqliteStateBackend {
    fn start_run(
        &self,
        pipeline: &PipelineId,
        table: &TableName,
        phase: RunPhase,
    ) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO table_runs (pipeline, table_name, phase, status) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                pipeline.as_str(),
                table.as_str(),
                phase.as_str(),
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE table_runs SET status = ?1, finished_at = datetime('now'), \
             rows = ?2, chunks = ?3, error_message = ?4 \
             WHERE id = ?5",
            rusqlite::params![
                status.as_str(),
                stats.rows as i64,
                i64::from(stats.chunks),
                stats.error_message,
                run_id,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn last_run(
        &self,
        pipeline: &PipelineId,
        table: &TableName,
        phase: RunPhase,
    ) -> error::Result<Option<RunRecord>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT id, phase, status, rows, chunks, error_message, started_at, finished_at \
                 FROM table_runs WHERE pipeline = ?1 AND table_name = ?2 AND phase = ?3 \
                 ORDER BY id DESC LIMIT 1",
                rusqlite::params![pipeline.as_str(), table.as_str(), phase.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, phase, status, rows, chunks, error_message, started_at, finished_at)) = row
        else {
            return Ok(None);
        };

        let status = RunStatus::parse(&status)
            .ok_or_else(|| StateError::Corrupt(format!("unknown status '{status}'")))?;

        Ok(Some(RunRecord {
            id,
            phase: Self::parse_phase(&phase)?,
            status,
            stats: RunStats {
                rows: rows.max(0) as u64,
                chunks: chunks.clamp(0, i64::from(u32::MAX)) as u32,
                error_message,
            },
            started_at: Self::sqlite_to_iso8601(&started_at),
            finished_at: finished_at.as_deref().map(Self::sqlite_to_iso8601),
        }))
    }
}
