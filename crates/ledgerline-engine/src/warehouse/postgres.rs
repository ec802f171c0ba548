//! Postgres warehouse: replace-loads via `COPY FROM STDIN`.

use std::time::Duration;

use anyhow::Context;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use futures_util::SinkExt;
use pg_escape::quote_identifier;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use super::copy_format::encode_copy_rows;
use super::ddl::{create_table_sql, qualified_table};
use super::Warehouse;

/// Flush the COPY buffer once it grows past this many bytes.
const COPY_FLUSH_BYTES: usize = 4 * 1024 * 1024;

/// Warehouse connection descriptor.
#[derive(Clone)]
pub struct WarehouseConnectOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Target schema for every loaded table.
    pub schema: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for WarehouseConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn format_pg_error(prefix: &str, error: &tokio_postgres::Error) -> String {
    if let Some(db_error) = error.as_db_error() {
        let detail = db_error.detail().unwrap_or("n/a");
        let hint = db_error.hint().unwrap_or("n/a");
        format!(
            "{prefix}: {} (sqlstate={} detail={} hint={})",
            db_error.message(),
            db_error.code().code(),
            detail,
            hint
        )
    } else {
        format!("{prefix}: {error}")
    }
}

/// One warehouse session, used for every artifact of a load run.
pub struct PgWarehouse {
    client: Client,
    schema: String,
}

impl PgWarehouse {
    /// Connect to the warehouse.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(options: &WarehouseConnectOptions) -> anyhow::Result<Self> {
        let mut pg = PgConfig::new();
        pg.host(&options.host);
        pg.port(options.port);
        pg.user(&options.user);
        if !options.password.is_empty() {
            pg.password(&options.password);
        }
        pg.dbname(&options.database);
        pg.connect_timeout(options.connect_timeout);

        let (client, connection) = pg.connect(NoTls).await.with_context(|| {
            format!(
                "connection to {}:{}/{} failed",
                options.host, options.port, options.database
            )
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "warehouse connection error");
            }
        });

        tracing::info!(
            host = %options.host,
            port = options.port,
            database = %options.database,
            schema = %options.schema,
            "warehouse connection opened"
        );
        Ok(Self {
            client,
            schema: options.schema.clone(),
        })
    }

    async fn exec(&self, sql: &str, what: &str) -> anyhow::Result<()> {
        tracing::debug!(sql, "warehouse statement");
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| anyhow::anyhow!(format_pg_error(what, &e)))
    }
}

impl Warehouse for PgWarehouse {
    async fn ensure_schema(&mut self) -> anyhow::Result<()> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier(&self.schema)
        );
        self.exec(&sql, "CREATE SCHEMA failed").await
    }

    async fn begin(&mut self) -> anyhow::Result<()> {
        self.exec("BEGIN", "BEGIN failed").await
    }

    async fn drop_table(&mut self, table: &str) -> anyhow::Result<()> {
        let sql = format!(
            "DROP TABLE IF EXISTS {} CASCADE",
            qualified_table(&self.schema, table)
        );
        self.exec(&sql, &format!("DROP failed for {table}")).await
    }

    async fn create_table(&mut self, table: &str, schema: &Schema) -> anyhow::Result<()> {
        let sql = create_table_sql(&self.schema, table, schema);
        self.exec(&sql, &format!("CREATE TABLE failed for {table}"))
            .await
    }

    async fn copy_batch(&mut self, table: &str, batch: &RecordBatch) -> anyhow::Result<u64> {
        if batch.num_rows() == 0 {
            return Ok(0);
        }

        let schema = batch.schema_ref();
        let col_list = schema
            .fields()
            .iter()
            .map(|f| quote_identifier(f.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let copy_stmt = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            qualified_table(&self.schema, table),
            col_list
        );

        let sink = self
            .client
            .copy_in(&copy_stmt)
            .await
            .map_err(|e| anyhow::anyhow!(format_pg_error("COPY start failed", &e)))?;
        let mut sink = Box::pin(sink);

        let mut buf = Vec::with_capacity(COPY_FLUSH_BYTES.min(batch.get_array_memory_size()));
        encode_copy_rows(batch, &mut buf)?;
        for piece in buf.chunks(COPY_FLUSH_BYTES) {
            sink.send(Bytes::copy_from_slice(piece))
                .await
                .map_err(|e| anyhow::anyhow!(format_pg_error("COPY send failed", &e)))?;
        }

        let rows = sink
            .as_mut()
            .finish()
            .await
            .map_err(|e| anyhow::anyhow!(format_pg_error("COPY finish failed", &e)))?;
        tracing::debug!(table, rows, "COPY batch written");
        Ok(rows)
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        self.exec("COMMIT", "COMMIT failed").await
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.exec("ROLLBACK", "ROLLBACK failed").await
    }
}
