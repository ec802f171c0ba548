//! Warehouse targets for replace-loads.

mod copy_format;
mod ddl;
pub mod postgres;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;

pub use copy_format::encode_copy_rows;
pub use ddl::{arrow_to_pg_type, create_table_sql};
pub use postgres::{PgWarehouse, WarehouseConnectOptions};

/// A warehouse connection that can replace a table's content inside a
/// transaction.
///
/// The loader drives the sequence `begin`, `drop_table`, `create_table`,
/// `copy_batch`..., `commit`, and calls `rollback` if any step fails.
#[allow(async_fn_in_trait)]
pub trait Warehouse {
    /// Create the target schema if it does not exist.
    async fn ensure_schema(&mut self) -> anyhow::Result<()>;

    async fn begin(&mut self) -> anyhow::Result<()>;

    /// `DROP TABLE IF EXISTS ... CASCADE`.
    async fn drop_table(&mut self, table: &str) -> anyhow::Result<()>;

    /// Create an empty table whose columns follow `schema` in order.
    async fn create_table(&mut self, table: &str, schema: &Schema) -> anyhow::Result<()>;

    /// Bulk-copy one batch, returning the number of rows written.
    async fn copy_batch(&mut self, table: &str, batch: &RecordBatch) -> anyhow::Result<u64>;

    async fn commit(&mut self) -> anyhow::Result<()>;

    async fn rollback(&mut self) -> anyhow::Result<()>;
}
