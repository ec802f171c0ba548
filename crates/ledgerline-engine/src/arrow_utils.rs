//! Row-to-Arrow encoding for staged chunks.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, StringArray, StringBuilder, TimestampMicrosecondArray,
};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{NaiveDate, NaiveDateTime};
use ledgerline_types::{CellValue, ChunkResult};

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Encode a chunk's rows as one batch conforming to `schema`.
///
/// The caller is responsible for checking that the chunk has as many
/// columns as the schema; rows shorter than the schema are rejected here.
pub fn chunk_to_record_batch(chunk: &ChunkResult, schema: &SchemaRef) -> Result<RecordBatch> {
    let arrays: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(col_idx, field)| {
            let cells = column_cells(chunk, col_idx)?;
            encode_column(&cells, field.data_type())
                .with_context(|| format!("column '{}' ({})", field.name(), field.data_type()))
        })
        .collect::<Result<_>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(chunk.num_rows()));
    RecordBatch::try_new_with_options(schema.clone(), arrays, &options)
        .context("Failed to create RecordBatch")
}

fn column_cells(chunk: &ChunkResult, col_idx: usize) -> Result<Vec<&CellValue>> {
    chunk
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            row.get(col_idx)
                .ok_or_else(|| anyhow!("row {row_idx} has {} cell(s), missing column {col_idx}", row.len()))
        })
        .collect()
}

fn encode_column(cells: &[&CellValue], data_type: &DataType) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Boolean => Arc::new(
            cells
                .iter()
                .map(|c| to_bool(c))
                .collect::<Result<BooleanArray>>()?,
        ),
        DataType::Int16 => Arc::new(
            cells
                .iter()
                .map(|c| to_narrow_int::<i16>(c))
                .collect::<Result<Int16Array>>()?,
        ),
        DataType::Int32 => Arc::new(
            cells
                .iter()
                .map(|c| to_narrow_int::<i32>(c))
                .collect::<Result<Int32Array>>()?,
        ),
        DataType::Int64 => Arc::new(cells.iter().map(|c| to_i64(c)).collect::<Result<Int64Array>>()?),
        DataType::Float32 => Arc::new(
            cells
                .iter()
                .map(|c| -> Result<Option<f32>> { Ok(to_f64(c)?.map(|v| v as f32)) })
                .collect::<Result<Float32Array>>()?,
        ),
        DataType::Float64 => Arc::new(cells.iter().map(|c| to_f64(c)).collect::<Result<Float64Array>>()?),
        DataType::Date32 => Arc::new(
            cells
                .iter()
                .map(|c| -> Result<Option<i32>> { Ok(to_date(c)?.map(days_since_epoch)) })
                .collect::<Result<Date32Array>>()?,
        ),
        DataType::Timestamp(TimeUnit::Microsecond, None) => Arc::new(
            cells
                .iter()
                .map(|c| -> Result<Option<i64>> {
                    Ok(to_timestamp(c)?.map(|ts| ts.and_utc().timestamp_micros()))
                })
                .collect::<Result<TimestampMicrosecondArray>>()?,
        ),
        DataType::Decimal128(_, _) => {
            // Parse via Arrow's own decimal caster so rounding/scale rules
            // match what the Parquet writer expects.
            let text = text_array(cells);
            let options = CastOptions {
                safe: false,
                ..CastOptions::default()
            };
            cast_with_options(&text, data_type, &options).context("decimal conversion failed")?
        }
        DataType::Utf8 => Arc::new(text_array(cells)),
        other => bail!("unsupported staging type {other}"),
    };
    Ok(array)
}

fn text_array(cells: &[&CellValue]) -> StringArray {
    let mut builder = StringBuilder::with_capacity(cells.len(), cells.len() * 16);
    for cell in cells {
        match cell {
            CellValue::Null => builder.append_null(),
            other => builder.append_value(other.to_string()),
        }
    }
    builder.finish()
}

fn to_bool(cell: &CellValue) -> Result<Option<bool>> {
    Ok(match cell {
        CellValue::Null => None,
        CellValue::Bool(v) => Some(*v),
        CellValue::Int(v) => Some(*v != 0),
        CellValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(true),
            "false" | "f" | "0" | "no" => Some(false),
            _ => bail!("cannot read '{s}' as boolean"),
        },
        other => bail!("cannot read {other:?} as boolean"),
    })
}

fn to_i64(cell: &CellValue) -> Result<Option<i64>> {
    Ok(match cell {
        CellValue::Null => None,
        CellValue::Int(v) => Some(*v),
        CellValue::Bool(v) => Some(i64::from(*v)),
        CellValue::Text(s) | CellValue::Decimal(s) => Some(
            s.trim()
                .parse()
                .with_context(|| format!("cannot read '{s}' as integer"))?,
        ),
        other => bail!("cannot read {other:?} as integer"),
    })
}

fn to_narrow_int<T>(cell: &CellValue) -> Result<Option<T>>
where
    T: TryFrom<i64>,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    match to_i64(cell)? {
        Some(v) => Ok(Some(T::try_from(v).with_context(|| format!("{v} out of range"))?)),
        None => Ok(None),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(cell: &CellValue) -> Result<Option<f64>> {
    Ok(match cell {
        CellValue::Null => None,
        CellValue::Float(v) => Some(*v),
        CellValue::Int(v) => Some(*v as f64),
        CellValue::Text(s) | CellValue::Decimal(s) => Some(
            s.trim()
                .parse()
                .with_context(|| format!("cannot read '{s}' as float"))?,
        ),
        other => bail!("cannot read {other:?} as float"),
    })
}

fn to_date(cell: &CellValue) -> Result<Option<NaiveDate>> {
    Ok(match cell {
        CellValue::Null => None,
        CellValue::Date(d) => Some(*d),
        CellValue::Timestamp(ts) => Some(ts.date()),
        CellValue::Text(s) => Some(
            NaiveDate::parse_from_str(s.trim(), DATE_FMT)
                .with_context(|| format!("cannot read '{s}' as date"))?,
        ),
        other => bail!("cannot read {other:?} as date"),
    })
}

fn to_timestamp(cell: &CellValue) -> Result<Option<NaiveDateTime>> {
    Ok(match cell {
        CellValue::Null => None,
        CellValue::Timestamp(ts) => Some(*ts),
        CellValue::Date(d) => Some(d.and_time(chrono::NaiveTime::MIN)),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            let parsed = TIMESTAMP_FMTS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok());
            Some(parsed.ok_or_else(|| anyhow!("cannot read '{s}' as timestamp"))?)
        }
        other => bail!("cannot read {other:?} as timestamp"),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Decimal128Array};
    use arrow::datatypes::{Field, Schema};
    use ledgerline_types::SourceTypeId;

    fn schema(fields: Vec<(&str, DataType)>) -> SchemaRef {
        Arc::new(Schema::new(
            fields
                .into_iter()
                .map(|(n, t)| Field::new(n, t, true))
                .collect::<Vec<_>>(),
        ))
    }

    fn chunk(rows: Vec<Vec<CellValue>>, ncols: usize) -> ChunkResult {
        ChunkResult {
            column_names: (0..ncols).map(|i| format!("c{i}")).collect(),
            column_source_types: vec![SourceTypeId(0); ncols],
            rows,
        }
    }

    #[test]
    fn encodes_mixed_row_into_typed_columns() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let s = schema(vec![
            ("id", DataType::Int32),
            ("flag", DataType::Boolean),
            ("amount", DataType::Decimal128(38, 20)),
            ("booked", DataType::Date32),
            ("name", DataType::Utf8),
        ]);
        let c = chunk(
            vec![
                vec![
                    CellValue::Int(1),
                    CellValue::Bool(true),
                    CellValue::Decimal("12.50".into()),
                    CellValue::Date(date),
                    CellValue::Text("Konto 201".into()),
                ],
                vec![
                    CellValue::Int(2),
                    CellValue::Null,
                    CellValue::Null,
                    CellValue::Null,
                    CellValue::Null,
                ],
            ],
            5,
        );
        let batch = chunk_to_record_batch(&c, &s).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let ids = batch.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ids.value(1), 2);
        let amounts = batch
            .column(2)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(amounts.value_as_string(0), "12.50000000000000000000");
        assert!(amounts.is_null(1));
        let dates = batch.column(3).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(dates.value(0), 19724);
        let names = batch.column(4).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "Konto 201");
        assert!(names.is_null(1));
    }

    #[test]
    fn timestamps_accept_text_and_dates() {
        let s = schema(vec![("ts", DataType::Timestamp(TimeUnit::Microsecond, None))]);
        let c = chunk(
            vec![
                vec![CellValue::Text("1970-01-01 00:00:01".into())],
                vec![CellValue::Date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap())],
            ],
            1,
        );
        let batch = chunk_to_record_batch(&c, &s).unwrap();
        let ts = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(ts.value(0), 1_000_000);
        assert_eq!(ts.value(1), 86_400_000_000);
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let s = schema(vec![("small", DataType::Int16)]);
        let c = chunk(vec![vec![CellValue::Int(70_000)]], 1);
        let err = chunk_to_record_batch(&c, &s).unwrap_err();
        assert!(format!("{err:#}").contains("small"), "got: {err:#}");
    }

    #[test]
    fn bad_decimal_text_is_an_error() {
        let s = schema(vec![("amount", DataType::Decimal128(10, 2))]);
        let c = chunk(vec![vec![CellValue::Text("twelve".into())]], 1);
        assert!(chunk_to_record_batch(&c, &s).is_err());
    }

    #[test]
    fn short_row_is_an_error() {
        let s = schema(vec![("a", DataType::Int64), ("b", DataType::Int64)]);
        let c = chunk(vec![vec![CellValue::Int(1)]], 2);
        let err = chunk_to_record_batch(&c, &s).unwrap_err();
        assert!(err.to_string().contains("missing column 1"), "got: {err}");
    }

    #[test]
    fn empty_chunk_keeps_schema() {
        let s = schema(vec![("a", DataType::Utf8)]);
        let batch = chunk_to_record_batch(&chunk(vec![], 1), &s).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema(), s);
    }
}
