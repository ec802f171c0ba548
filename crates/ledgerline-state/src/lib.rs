//! Run-history persistence for the ledgerline pipeline.
//!
//! Provides the [`StateBackend`] trait and a [`SqliteStateBackend`]
//! implementation recording one row per table per phase per run.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::StateBackend;
pub use error::StateError;
pub use sqlite::SqliteStateBackend;
