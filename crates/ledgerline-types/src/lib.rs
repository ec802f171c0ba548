//! Shared model types for the ledgerline pipeline.
//!
//! Pure data: no I/O, no async. The engine, state and CLI crates all
//! depend on this crate so the model has a single definition.

#![warn(clippy::pedantic)]

pub mod chunk;
pub mod state;
pub mod window;

pub use chunk::{CellValue, ChunkResult, SourceTypeId};
pub use window::DateWindow;
