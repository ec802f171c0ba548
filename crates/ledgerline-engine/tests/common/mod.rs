//! In-process fakes shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use chrono::{Days, NaiveDate};
use ledgerline_engine::warehouse::encode_copy_rows;
use ledgerline_engine::{SourceClient, Warehouse};
use ledgerline_types::{CellValue, ChunkResult, DateWindow, SourceTypeId};

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures")
}

pub const COLUMNS: [&str; 4] = ["account", "posted_on", "amount", "memo"];
pub const TYPES: [i64; 4] = [23, 1082, 1700, 25];

/// Source returning one row per day of the requested window, or three
/// fixed rows for a static query.
#[derive(Default)]
pub struct LedgerSource {
    pub calls: Vec<Option<DateWindow>>,
    /// Fail this many fetches before answering.
    pub failures: u32,
    /// From this call index on, chunks carry an extra column.
    pub widen_from_call: Option<usize>,
}

impl LedgerSource {
    fn row(id: i64, day: NaiveDate) -> Vec<CellValue> {
        vec![
            CellValue::Int(id),
            CellValue::Date(day),
            CellValue::Decimal(format!("{id}.25")),
            CellValue::Text(format!("entry {id}")),
        ]
    }
}

impl SourceClient for LedgerSource {
    async fn fetch(
        &mut self,
        _query: &str,
        window: Option<&DateWindow>,
    ) -> anyhow::Result<ChunkResult> {
        let call = self.calls.len();
        self.calls.push(window.copied());
        if self.failures > 0 {
            self.failures -= 1;
            anyhow::bail!("deadlock victim");
        }

        let rows: Vec<Vec<CellValue>> = match window {
            Some(w) => (0..w.num_days())
                .map(|offset| {
                    let day = w.start + Days::new(u64::try_from(offset).unwrap());
                    let id = (day - d(2024, 1, 1)).num_days() + 1;
                    Self::row(id, day)
                })
                .collect(),
            None => (1..=3).map(|id| Self::row(id, d(2024, 1, 1))).collect(),
        };

        let mut chunk = ChunkResult {
            column_names: COLUMNS.iter().map(ToString::to_string).collect(),
            column_source_types: TYPES.iter().copied().map(SourceTypeId).collect(),
            rows,
        };
        if self.widen_from_call.is_some_and(|from| call >= from) {
            chunk.column_names.push("extra".into());
            chunk.column_source_types.push(SourceTypeId(25));
            for row in &mut chunk.rows {
                row.push(CellValue::Null);
            }
        }
        Ok(chunk)
    }
}

/// Warehouse keeping committed tables in memory as COPY text lines.
#[derive(Default)]
pub struct MemoryWarehouse {
    pub ops: Vec<String>,
    pub committed: BTreeMap<String, (Vec<String>, Vec<String>)>,
    pending: BTreeMap<String, (Vec<String>, Vec<String>)>,
    pub fail_copy_for: Option<String>,
}

impl MemoryWarehouse {
    /// Warehouse whose COPY into `table` always fails.
    pub fn failing_on(table: &str) -> Self {
        Self {
            fail_copy_for: Some(table.to_string()),
            ..Self::default()
        }
    }
}

impl Warehouse for MemoryWarehouse {
    async fn ensure_schema(&mut self) -> anyhow::Result<()> {
        self.ops.push("ensure_schema".into());
        Ok(())
    }

    async fn begin(&mut self) -> anyhow::Result<()> {
        self.ops.push("begin".into());
        self.pending = self.committed.clone();
        Ok(())
    }

    async fn drop_table(&mut self, table: &str) -> anyhow::Result<()> {
        self.ops.push(format!("drop {table}"));
        self.pending.remove(table);
        Ok(())
    }

    async fn create_table(&mut self, table: &str, schema: &Schema) -> anyhow::Result<()> {
        self.ops.push(format!("create {table}"));
        let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
        self.pending.insert(table.to_string(), (columns, Vec::new()));
        Ok(())
    }

    async fn copy_batch(&mut self, table: &str, batch: &RecordBatch) -> anyhow::Result<u64> {
        self.ops.push(format!("copy {table}"));
        if self.fail_copy_for.as_deref() == Some(table) {
            anyhow::bail!("value too long for type character varying(20)");
        }
        let mut buf = Vec::new();
        let rows = encode_copy_rows(batch, &mut buf)?;
        let text = String::from_utf8(buf)?;
        let entry = self
            .pending
            .get_mut(table)
            .ok_or_else(|| anyhow::anyhow!("relation {table} does not exist"))?;
        entry.1.extend(text.lines().map(str::to_string));
        Ok(rows as u64)
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        self.ops.push("commit".into());
        self.committed = std::mem::take(&mut self.pending);
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.ops.push("rollback".into());
        self.pending.clear();
        Ok(())
    }
}
