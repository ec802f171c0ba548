//! Local staging store.
//!
//! Each table is staged in `{temp_dir}/{table}.arrows`, an Arrow IPC
//! stream that grows by one batch per chunk. Export rewrites the stream
//! as `{data_dir}/{table}.parquet`. The staging file is removed before a
//! table is staged (leftovers of a crashed run) and again when the table
//! is released, whatever the outcome.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::Context;
use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use ledgerline_types::{ChunkResult, SourceTypeId};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::arrow_utils::chunk_to_record_batch;
use crate::error::PipelineError;
use crate::type_map::TypeMap;

pub const STAGING_EXTENSION: &str = "arrows";
pub const ARTIFACT_EXTENSION: &str = "parquet";

/// The exported file for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub table_name: String,
    pub path: PathBuf,
    pub rows: u64,
}

/// Arena of staging tables keyed by table name.
#[derive(Debug, Clone)]
pub struct StagingStore {
    temp_dir: PathBuf,
    data_dir: PathBuf,
    type_map: TypeMap,
}

impl StagingStore {
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>, type_map: TypeMap) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            data_dir: data_dir.into(),
            type_map,
        }
    }

    #[must_use]
    pub fn staging_path(&self, table: &str) -> PathBuf {
        self.temp_dir.join(format!("{table}.{STAGING_EXTENSION}"))
    }

    #[must_use]
    pub fn artifact_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.{ARTIFACT_EXTENSION}"))
    }

    #[must_use]
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Reserve the staging slot for `table`, deleting any leftover file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Staging`] if the temp directory cannot be
    /// created or the stale file cannot be removed.
    pub fn acquire(&self, table: &str) -> Result<StagingTable<'_>, PipelineError> {
        std::fs::create_dir_all(&self.temp_dir)
            .with_context(|| format!("cannot create temp dir {}", self.temp_dir.display()))
            .map_err(|e| PipelineError::staging(table, e))?;

        let path = self.staging_path(table);
        if remove_if_exists(&path).map_err(|e| PipelineError::staging(table, e))? {
            tracing::warn!(table, path = %path.display(), "Removed leftover staging file");
        }

        Ok(StagingTable {
            name: table.to_string(),
            path,
            artifact_path: self.artifact_path(table),
            type_map: &self.type_map,
            schema: None,
            source_columns: Vec::new(),
            writer: None,
            rows: 0,
            chunks: 0,
            released: false,
        })
    }
}

/// One table's staging file, owned exclusively for the duration of
/// that table's extraction.
pub struct StagingTable<'a> {
    name: String,
    path: PathBuf,
    artifact_path: PathBuf,
    type_map: &'a TypeMap,
    schema: Option<SchemaRef>,
    source_columns: Vec<(String, SourceTypeId)>,
    writer: Option<StreamWriter<BufWriter<File>>>,
    rows: u64,
    chunks: u32,
    released: bool,
}

impl StagingTable<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema derived from the first chunk, once created.
    #[must_use]
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    #[must_use]
    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    /// Create the staging table from the first chunk's column metadata.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Staging`] if the table was already created
    /// or the staging file cannot be opened.
    pub fn create(&mut self, first: &ChunkResult) -> Result<(), PipelineError> {
        if self.schema.is_some() {
            return Err(PipelineError::staging(
                &self.name,
                anyhow::anyhow!("staging table already created"),
            ));
        }

        let schema = self.type_map.schema_for(first);
        let file = File::create(&self.path)
            .with_context(|| format!("cannot create {}", self.path.display()))
            .map_err(|e| PipelineError::staging(&self.name, e))?;
        let writer = StreamWriter::try_new(BufWriter::new(file), &schema)
            .context("Failed to create Arrow IPC StreamWriter")
            .map_err(|e| PipelineError::staging(&self.name, e))?;

        tracing::info!(
            table = %self.name,
            columns = schema.fields().len(),
            schema = ?schema.fields().iter().map(|f| format!("{}:{}", f.name(), f.data_type())).collect::<Vec<_>>(),
            "Created staging table"
        );

        self.source_columns = first
            .columns()
            .map(|(name, id)| (name.to_string(), id))
            .collect();
        self.schema = Some(schema);
        self.writer = Some(writer);
        Ok(())
    }

    /// Append one chunk as a single batch.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SchemaMismatch`] if the chunk's column count
    /// differs from the staging table's, or [`PipelineError::Staging`] if
    /// the rows cannot be encoded or written.
    pub fn append(&mut self, chunk: &ChunkResult) -> Result<(), PipelineError> {
        let (Some(schema), Some(writer)) = (self.schema.as_ref(), self.writer.as_mut()) else {
            return Err(PipelineError::staging(
                &self.name,
                anyhow::anyhow!("append before create"),
            ));
        };

        let expected = schema.fields().len();
        if chunk.num_columns() != expected {
            return Err(PipelineError::SchemaMismatch {
                table: self.name.clone(),
                expected,
                actual: chunk.num_columns(),
            });
        }

        for ((name, id), (first_name, first_id)) in chunk.columns().zip(&self.source_columns) {
            if name != first_name || id != *first_id {
                tracing::warn!(
                    table = %self.name,
                    column = name,
                    type_id = %id,
                    first_column = %first_name,
                    first_type_id = %first_id,
                    "Chunk column differs from first chunk; staging by position"
                );
            }
        }

        let batch = chunk_to_record_batch(chunk, schema)
            .map_err(|e| PipelineError::staging(&self.name, e))?;
        writer
            .write(&batch)
            .context("Failed to write RecordBatch to IPC")
            .map_err(|e| PipelineError::staging(&self.name, e))?;

        self.rows += chunk.num_rows() as u64;
        self.chunks += 1;
        tracing::debug!(
            table = %self.name,
            rows = chunk.num_rows(),
            total_rows = self.rows,
            chunks = self.chunks,
            "Appended chunk"
        );
        Ok(())
    }

    /// Write the whole staged table to `{data_dir}/{table}.parquet`,
    /// replacing any previous artifact.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Staging`] if nothing was staged or any
    /// read/write step fails.
    pub fn export(&mut self) -> Result<ExportArtifact, PipelineError> {
        let writer = self.writer.take().ok_or_else(|| {
            PipelineError::staging(&self.name, anyhow::anyhow!("nothing staged to export"))
        })?;
        writer
            .into_inner()
            .context("Failed to finish IPC stream")
            .and_then(|buffered| {
                buffered
                    .into_inner()
                    .map_err(std::io::IntoInnerError::into_error)
                    .context("Failed to flush staging file")
            })
            .map_err(|e| PipelineError::staging(&self.name, e))?;

        self.write_artifact()
            .map_err(|e| PipelineError::staging(&self.name, e))?;

        tracing::info!(
            table = %self.name,
            rows = self.rows,
            path = %self.artifact_path.display(),
            "Exported artifact"
        );
        Ok(ExportArtifact {
            table_name: self.name.clone(),
            path: self.artifact_path.clone(),
            rows: self.rows,
        })
    }

    fn write_artifact(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.artifact_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create data dir {}", dir.display()))?;
        }

        let input = File::open(&self.path)
            .with_context(|| format!("cannot reopen {}", self.path.display()))?;
        let reader = StreamReader::try_new(BufReader::new(input), None)
            .context("Failed to create Arrow IPC StreamReader")?;

        let tmp_path = self.artifact_path.with_extension(format!("{ARTIFACT_EXTENSION}.tmp"));
        let output = File::create(&tmp_path)
            .with_context(|| format!("cannot create {}", tmp_path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(output, reader.schema(), Some(props))
            .context("parquet writer init failed")?;
        for maybe_batch in reader {
            let batch = maybe_batch.context("Failed to read RecordBatch from IPC stream")?;
            writer.write(&batch).context("parquet write failed")?;
        }
        writer.close().context("parquet close failed")?;

        std::fs::rename(&tmp_path, &self.artifact_path).with_context(|| {
            format!("cannot move artifact into {}", self.artifact_path.display())
        })?;
        Ok(())
    }

    /// Delete the staging file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Staging`] if the file exists but cannot be
    /// removed.
    pub fn release(mut self) -> Result<(), PipelineError> {
        self.released = true;
        self.cleanup()
            .map_err(|e| PipelineError::staging(&self.name, e))
    }

    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.writer = None;
        if remove_if_exists(&self.path)? {
            tracing::debug!(table = %self.name, "Removed staging file");
        }
        Ok(())
    }
}

impl Drop for StagingTable<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.cleanup() {
            tracing::warn!(table = %self.name, error = %e, "Failed to remove staging file");
        }
    }
}

fn remove_if_exists(path: &Path) -> anyhow::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("cannot remove {}", path.display())),
    }
}

/// Outcome of [`clean_dir`]. Both lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
    /// `.gitignore` and sub-directories, left in place.
    pub skipped: Vec<PathBuf>,
}

/// Delete every regular file in `dir` except `.gitignore`.
///
/// Sub-directories are left alone. Every deletion and every skipped
/// entry is logged. A missing directory is not an error.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a file cannot be
/// removed.
pub fn clean_dir(dir: &Path) -> anyhow::Result<CleanReport> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(dir = %dir.display(), "Temp directory does not exist, nothing to clean");
            return Ok(CleanReport::default());
        }
        Err(e) => return Err(e).with_context(|| format!("cannot list {}", dir.display())),
    };

    let mut report = CleanReport::default();
    for entry in entries {
        let entry = entry.with_context(|| format!("cannot list {}", dir.display()))?;
        let path = entry.path();
        if entry.file_name() == ".gitignore" {
            tracing::info!(path = %path.display(), "Skipping .gitignore");
            report.skipped.push(path);
            continue;
        }
        if !entry.file_type()?.is_file() {
            tracing::info!(path = %path.display(), "Skipping directory");
            report.skipped.push(path);
            continue;
        }
        std::fs::remove_file(&path).with_context(|| format!("cannot remove {}", path.display()))?;
        tracing::info!(path = %path.display(), "Deleted temp file");
        report.removed.push(path);
    }
    report.removed.sort();
    report.skipped.sort();

    tracing::info!(
        dir = %dir.display(),
        removed = report.removed.len(),
        skipped = report.skipped.len(),
        "Temp directory cleaned"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, Int32Array, StringArray};
    use ledgerline_types::CellValue;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use super::*;

    fn chunk(rows: &[(i64, &str)]) -> ChunkResult {
        ChunkResult {
            column_names: vec!["id".into(), "label".into()],
            column_source_types: vec![SourceTypeId(23), SourceTypeId(25)],
            rows: rows
                .iter()
                .map(|(id, label)| vec![CellValue::Int(*id), CellValue::Text((*label).into())])
                .collect(),
        }
    }

    fn store(dir: &Path) -> StagingStore {
        StagingStore::new(dir.join("temp"), dir.join("data"), TypeMap::postgres())
    }

    fn read_artifact(path: &Path) -> Vec<arrow::record_batch::RecordBatch> {
        let file = File::open(path).unwrap();
        ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn stage_export_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut table = store.acquire("orders").unwrap();
        table.create(&chunk(&[(1, "a")])).unwrap();
        table.append(&chunk(&[(1, "a")])).unwrap();
        table.append(&chunk(&[(2, "b"), (3, "c")])).unwrap();
        assert!(table.path().exists());
        let artifact = table.export().unwrap();
        table.release().unwrap();

        assert_eq!(artifact.rows, 3);
        assert_eq!(artifact.path, dir.path().join("data").join("orders.parquet"));
        assert!(!store.staging_path("orders").exists());

        let batches = read_artifact(&artifact.path);
        let schema = batches[0].schema();
        let all = arrow::compute::concat_batches(&schema, &batches).unwrap();
        assert_eq!(all.num_rows(), 3);
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["id", "label"]);
        let ids = all.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2, 3]);
        let labels = all.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(labels.value(2), "c");
    }

    #[test]
    fn acquire_removes_leftover_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::create_dir_all(dir.path().join("temp")).unwrap();
        std::fs::write(store.staging_path("orders"), b"garbage from a crashed run").unwrap();

        let table = store.acquire("orders").unwrap();
        assert!(!table.path().exists());
    }

    #[test]
    fn column_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut table = store.acquire("orders").unwrap();
        table.create(&chunk(&[(1, "a")])).unwrap();

        let mut wide = chunk(&[(2, "b")]);
        wide.column_names.push("extra".into());
        wide.column_source_types.push(SourceTypeId(25));
        wide.rows[0].push(CellValue::Null);

        let err = table.append(&wide).unwrap_err();
        assert!(
            matches!(err, PipelineError::SchemaMismatch { expected: 2, actual: 3, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn drop_without_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let path = {
            let mut table = store.acquire("orders").unwrap();
            table.create(&chunk(&[(1, "a")])).unwrap();
            table.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn export_overwrites_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for rows in [&[(1, "a"), (2, "b")][..], &[(3, "c")][..]] {
            let mut table = store.acquire("orders").unwrap();
            table.create(&chunk(rows)).unwrap();
            table.append(&chunk(rows)).unwrap();
            table.export().unwrap();
            table.release().unwrap();
        }
        let batches = read_artifact(&store.artifact_path("orders"));
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn export_before_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut table = store.acquire("orders").unwrap();
        assert!(matches!(
            table.export().unwrap_err(),
            PipelineError::Staging { .. }
        ));
    }

    #[test]
    fn clean_dir_keeps_gitignore_and_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*\n").unwrap();
        std::fs::write(dir.path().join("a.arrows"), b"x").unwrap();
        std::fs::write(dir.path().join("b.tmp"), b"y").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let report = clean_dir(dir.path()).unwrap();
        assert_eq!(
            report.removed,
            vec![dir.path().join("a.arrows"), dir.path().join("b.tmp")]
        );
        assert_eq!(
            report.skipped,
            vec![dir.path().join(".gitignore"), dir.path().join("nested")]
        );
        assert!(dir.path().join(".gitignore").exists());
        assert!(dir.path().join("nested").is_dir());
        assert!(!dir.path().join("a.arrows").exists());
    }

    #[test]
    fn clean_dir_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            clean_dir(&dir.path().join("nope")).unwrap(),
            CleanReport::default()
        );
    }
}
