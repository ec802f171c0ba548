//! Postgres source adapter.
//!
//! Column type ids are the Postgres type OIDs reported by the prepared
//! statement, so the default [`crate::type_map::TypeMap::postgres`]
//! table applies. Columns without a native decoder are fetched through a
//! `::text` cast but keep their original OID.

use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ledgerline_types::{CellValue, ChunkResult, DateWindow, SourceTypeId};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row};

use super::text_cast::wrap_with_text_casts;
use super::SourceClient;

/// Server-level connection settings shared by every table of a run.
/// The database name is supplied per table.
#[derive(Clone)]
pub struct SourceConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Applied both as the connect timeout and as `statement_timeout`.
    pub timeout: Duration,
}

impl std::fmt::Debug for SourceConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Scoped connection to one source database. The session ends when the
/// value is dropped.
pub struct PgSource {
    client: Client,
    database: String,
}

impl PgSource {
    /// Open a connection to `database` on the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable, authentication fails
    /// or the connect timeout expires.
    pub async fn connect(options: &SourceConnectOptions, database: &str) -> anyhow::Result<Self> {
        let mut pg = PgConfig::new();
        pg.host(&options.host);
        pg.port(options.port);
        pg.user(&options.user);
        if !options.password.is_empty() {
            pg.password(&options.password);
        }
        pg.dbname(database);
        pg.connect_timeout(options.timeout);
        pg.options(&format!(
            "-c statement_timeout={}",
            options.timeout.as_millis()
        ));

        let (client, connection) = pg.connect(NoTls).await.with_context(|| {
            format!(
                "connection to {}:{}/{} failed",
                options.host, options.port, database
            )
        })?;

        let db = database.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(database = %db, error = %e, "source connection error");
            }
        });

        tracing::info!(
            host = %options.host,
            port = options.port,
            database,
            "source connection opened"
        );
        Ok(Self {
            client,
            database: database.to_string(),
        })
    }
}

impl Drop for PgSource {
    fn drop(&mut self) {
        tracing::info!(database = %self.database, "source connection closed");
    }
}

impl SourceClient for PgSource {
    async fn fetch(
        &mut self,
        query: &str,
        window: Option<&DateWindow>,
    ) -> anyhow::Result<ChunkResult> {
        let described = self
            .client
            .prepare(query)
            .await
            .context("failed to prepare source query")?;

        let column_names: Vec<String> = described
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let source_types: Vec<Type> = described
            .columns()
            .iter()
            .map(|c| c.type_().clone())
            .collect();

        let stmt = match wrap_with_text_casts(
            query,
            column_names
                .iter()
                .zip(&source_types)
                .map(|(name, ty)| (name.as_str(), ty.name())),
        ) {
            Some(cast_query) => {
                tracing::debug!(query = %cast_query, "reading non-native columns as text");
                self.client
                    .prepare(&cast_query)
                    .await
                    .context("failed to prepare text-cast source query")?
            }
            None => described,
        };
        let fetched_types: Vec<Type> = stmt.columns().iter().map(|c| c.type_().clone()).collect();

        let rows = match window {
            Some(w) => self.client.query(&stmt, &[&w.start, &w.end]).await,
            None => self.client.query(&stmt, &[]).await,
        }
        .context("source query failed")?;

        let rows = rows
            .iter()
            .map(|row| decode_row(row, &column_names, &fetched_types, &source_types))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ChunkResult {
            column_source_types: source_types
                .iter()
                .map(|t| SourceTypeId(i64::from(t.oid())))
                .collect(),
            column_names,
            rows,
        })
    }
}

fn decode_row(
    row: &Row,
    names: &[String],
    fetched: &[Type],
    source: &[Type],
) -> anyhow::Result<Vec<CellValue>> {
    fetched
        .iter()
        .zip(source)
        .enumerate()
        .map(|(idx, (ty, source_ty))| {
            decode_cell(row, idx, ty, source_ty).with_context(|| {
                format!("cannot decode column '{}' ({})", names[idx], source_ty.name())
            })
        })
        .collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> anyhow::Result<Option<T>> {
    Ok(row.try_get::<_, Option<T>>(idx)?)
}

/// Decode one cell by its fetched type. `source_ty` differs from `ty` only
/// for text-cast columns; cast `numeric` values become decimal cells.
fn decode_cell(row: &Row, idx: usize, ty: &Type, source_ty: &Type) -> anyhow::Result<CellValue> {
    let cell = match ty.name() {
        "bool" => get::<bool>(row, idx)?.map(CellValue::Bool),
        "int2" => get::<i16>(row, idx)?.map(|v| CellValue::Int(v.into())),
        "int4" => get::<i32>(row, idx)?.map(|v| CellValue::Int(v.into())),
        "int8" => get::<i64>(row, idx)?.map(CellValue::Int),
        "float4" => get::<f32>(row, idx)?.map(|v| CellValue::Float(v.into())),
        "float8" => get::<f64>(row, idx)?.map(CellValue::Float),
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, idx)?.map(|v| {
            if *source_ty == Type::NUMERIC {
                CellValue::Decimal(v)
            } else {
                CellValue::Text(v)
            }
        }),
        "date" => get::<NaiveDate>(row, idx)?.map(CellValue::Date),
        "timestamp" => get::<NaiveDateTime>(row, idx)?.map(CellValue::Timestamp),
        "timestamptz" => {
            get::<DateTime<Utc>>(row, idx)?.map(|v| CellValue::Timestamp(v.naive_utc()))
        }
        other => bail!("no decoder for fetched type {other}"),
    };
    Ok(cell.unwrap_or(CellValue::Null))
}
