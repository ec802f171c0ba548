//! COPY text-format encoding of staged batches.
//!
//! Format rules:
//! - NULL: `\N`
//! - Strings: backslash-escape `\`, tab, newline, carriage return; strip NUL bytes
//! - Booleans: `t` / `f`
//! - Floats: `NaN`, `Infinity`, `-Infinity` for the special values
//! - Decimals: plain text at the column's scale

use std::io::Write;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Days, NaiveDate};

/// Arrow column resolved to its concrete array type once per batch.
enum TypedCol<'a> {
    Boolean(&'a BooleanArray),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Decimal128(&'a Decimal128Array),
    Utf8(&'a StringArray),
    Date32(&'a Date32Array),
    TimestampMicros(&'a TimestampMicrosecondArray),
    Binary(&'a BinaryArray),
    Null,
}

fn downcast<'a, T: 'static>(col: &'a dyn Array, name: &str) -> Result<&'a T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("column '{name}' does not match its declared type"))
}

fn downcast_columns(batch: &RecordBatch) -> Result<Vec<TypedCol<'_>>> {
    let schema = batch.schema_ref();
    batch
        .columns()
        .iter()
        .zip(schema.fields())
        .map(|(col, field)| {
            let name = field.name();
            let col = col.as_ref();
            Ok(match col.data_type() {
                DataType::Boolean => TypedCol::Boolean(downcast(col, name)?),
                DataType::Int16 => TypedCol::Int16(downcast(col, name)?),
                DataType::Int32 => TypedCol::Int32(downcast(col, name)?),
                DataType::Int64 => TypedCol::Int64(downcast(col, name)?),
                DataType::Float32 => TypedCol::Float32(downcast(col, name)?),
                DataType::Float64 => TypedCol::Float64(downcast(col, name)?),
                DataType::Decimal128(_, _) => TypedCol::Decimal128(downcast(col, name)?),
                DataType::Utf8 => TypedCol::Utf8(col.as_string::<i32>()),
                DataType::Date32 => TypedCol::Date32(downcast(col, name)?),
                DataType::Timestamp(TimeUnit::Microsecond, _) => {
                    TypedCol::TimestampMicros(downcast(col, name)?)
                }
                DataType::Binary => TypedCol::Binary(downcast(col, name)?),
                DataType::Null => TypedCol::Null,
                other => bail!("column '{name}' has unsupported type {other} for COPY"),
            })
        })
        .collect()
}

fn write_float<T: Into<f64> + std::fmt::Display + Copy>(buf: &mut Vec<u8>, v: T) {
    let f: f64 = v.into();
    if f.is_nan() {
        buf.extend_from_slice(b"NaN");
    } else if f.is_infinite() {
        if f > 0.0 {
            buf.extend_from_slice(b"Infinity");
        } else {
            buf.extend_from_slice(b"-Infinity");
        }
    } else {
        let _ = write!(buf, "{v}");
    }
}

fn write_text(buf: &mut Vec<u8>, val: &str) {
    for byte in val.bytes() {
        match byte {
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            0 => {}
            _ => buf.push(byte),
        }
    }
}

fn format_value(buf: &mut Vec<u8>, col: &TypedCol<'_>, row_idx: usize) {
    macro_rules! null_or {
        ($arr:expr) => {
            if $arr.is_null(row_idx) {
                buf.extend_from_slice(b"\\N");
                return;
            }
        };
    }

    match col {
        TypedCol::Null => buf.extend_from_slice(b"\\N"),
        TypedCol::Boolean(arr) => {
            null_or!(arr);
            buf.push(if arr.value(row_idx) { b't' } else { b'f' });
        }
        TypedCol::Int16(arr) => {
            null_or!(arr);
            let _ = write!(buf, "{}", arr.value(row_idx));
        }
        TypedCol::Int32(arr) => {
            null_or!(arr);
            let _ = write!(buf, "{}", arr.value(row_idx));
        }
        TypedCol::Int64(arr) => {
            null_or!(arr);
            let _ = write!(buf, "{}", arr.value(row_idx));
        }
        TypedCol::Float32(arr) => {
            null_or!(arr);
            write_float(buf, arr.value(row_idx));
        }
        TypedCol::Float64(arr) => {
            null_or!(arr);
            write_float(buf, arr.value(row_idx));
        }
        TypedCol::Decimal128(arr) => {
            null_or!(arr);
            buf.extend_from_slice(arr.value_as_string(row_idx).as_bytes());
        }
        TypedCol::Utf8(arr) => {
            null_or!(arr);
            write_text(buf, arr.value(row_idx));
        }
        TypedCol::Date32(arr) => {
            null_or!(arr);
            let days = arr.value(row_idx);
            let epoch = NaiveDate::default();
            let date = if days >= 0 {
                epoch.checked_add_days(Days::new(days.unsigned_abs().into()))
            } else {
                epoch.checked_sub_days(Days::new(days.unsigned_abs().into()))
            };
            match date {
                Some(date) => {
                    let _ = write!(buf, "{date}");
                }
                None => buf.extend_from_slice(b"\\N"),
            }
        }
        TypedCol::TimestampMicros(arr) => {
            null_or!(arr);
            let micros = arr.value(row_idx);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let nsecs = (micros.rem_euclid(1_000_000) * 1_000) as u32;
            match DateTime::from_timestamp(micros.div_euclid(1_000_000), nsecs) {
                Some(dt) => {
                    let _ = write!(buf, "{}", dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f"));
                }
                None => buf.extend_from_slice(b"\\N"),
            }
        }
        TypedCol::Binary(arr) => {
            null_or!(arr);
            buf.extend_from_slice(b"\\\\x");
            for byte in arr.value(row_idx) {
                let _ = write!(buf, "{byte:02x}");
            }
        }
    }
}

/// Encode every row of `batch` as COPY text lines, appending to `buf`.
/// Returns the number of rows encoded.
///
/// # Errors
///
/// Returns an error if a column has a type with no COPY encoding.
pub fn encode_copy_rows(batch: &RecordBatch, buf: &mut Vec<u8>) -> Result<usize> {
    let cols = downcast_columns(batch)?;
    for row_idx in 0..batch.num_rows() {
        for (pos, col) in cols.iter().enumerate() {
            if pos > 0 {
                buf.push(b'\t');
            }
            format_value(buf, col, row_idx);
        }
        buf.push(b'\n');
    }
    Ok(batch.num_rows())
}
