//! Source type id -> staging column type registry.
//!
//! Each source dialect has an explicit table. Ids missing from the table
//! fall back to [`TargetType::Text`], so mapping never fails. Tables can
//! be extended or overridden from configuration.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use ledgerline_types::{ChunkResult, SourceTypeId};
use serde::Deserialize;

/// Column type of the staging table (and therefore of the artifact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: i8 },
    Varchar { max_len: u32 },
    Text,
    Date,
    Timestamp,
}

impl TargetType {
    /// Arrow type used for the staged column.
    #[must_use]
    pub fn to_arrow(self) -> DataType {
        match self {
            Self::Boolean => DataType::Boolean,
            Self::SmallInt => DataType::Int16,
            Self::Integer => DataType::Int32,
            Self::BigInt => DataType::Int64,
            Self::Real => DataType::Float32,
            Self::Double => DataType::Float64,
            Self::Decimal { precision, scale } => DataType::Decimal128(precision, scale),
            Self::Varchar { .. } | Self::Text => DataType::Utf8,
            Self::Date => DataType::Date32,
            Self::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::SmallInt => f.write_str("SMALLINT"),
            Self::Integer => f.write_str("INTEGER"),
            Self::BigInt => f.write_str("BIGINT"),
            Self::Real => f.write_str("REAL"),
            Self::Double => f.write_str("DOUBLE"),
            Self::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            Self::Varchar { max_len } => write!(f, "VARCHAR({max_len})"),
            Self::Text => f.write_str("VARCHAR"),
            Self::Date => f.write_str("DATE"),
            Self::Timestamp => f.write_str("TIMESTAMP"),
        }
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let (name, args) = match upper.split_once('(') {
            Some((name, rest)) => {
                let args = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("unbalanced parentheses in type '{s}'"))?;
                (name.trim(), Some(args))
            }
            None => (upper.as_str(), None),
        };

        match (name, args) {
            ("BOOLEAN" | "BOOL" | "BIT", None) => Ok(Self::Boolean),
            ("SMALLINT" | "INT2", None) => Ok(Self::SmallInt),
            ("INTEGER" | "INT" | "INT4", None) => Ok(Self::Integer),
            ("BIGINT" | "INT8", None) => Ok(Self::BigInt),
            ("REAL" | "FLOAT4", None) => Ok(Self::Real),
            ("DOUBLE" | "FLOAT8" | "DOUBLE PRECISION", None) => Ok(Self::Double),
            ("DECIMAL" | "NUMERIC", Some(args)) => parse_decimal_args(args, s),
            ("DECIMAL" | "NUMERIC", None) => Ok(Self::Decimal {
                precision: 38,
                scale: 20,
            }),
            ("VARCHAR", Some(args)) => args
                .trim()
                .parse::<u32>()
                .map(|max_len| Self::Varchar { max_len })
                .map_err(|_| format!("invalid VARCHAR length in '{s}'")),
            ("VARCHAR" | "TEXT" | "STRING", None) => Ok(Self::Text),
            ("DATE", None) => Ok(Self::Date),
            ("TIMESTAMP" | "DATETIME", None) => Ok(Self::Timestamp),
            _ => Err(format!("unsupported target type '{s}'")),
        }
    }
}

fn parse_decimal_args(args: &str, original: &str) -> Result<TargetType, String> {
    let (p, s) = args
        .split_once(',')
        .ok_or_else(|| format!("DECIMAL needs (precision,scale) in '{original}'"))?;
    let precision: u8 = p
        .trim()
        .parse()
        .map_err(|_| format!("invalid precision in '{original}'"))?;
    let scale: i8 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid scale in '{original}'"))?;
    if precision == 0 || precision > 38 {
        return Err(format!("precision must be 1..=38 in '{original}'"));
    }
    if scale < 0 || scale.unsigned_abs() > precision {
        return Err(format!("scale must be 0..=precision in '{original}'"));
    }
    Ok(TargetType::Decimal { precision, scale })
}

/// Which driver family produced the type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDialect {
    /// Postgres type OIDs.
    #[default]
    Postgres,
    /// SQL Server DB-API type codes.
    Mssql,
}

/// Immutable source-type-id -> [`TargetType`] table with a text default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMap {
    entries: BTreeMap<SourceTypeId, TargetType>,
}

impl TypeMap {
    /// Built-in table for a dialect.
    #[must_use]
    pub fn for_dialect(dialect: SourceDialect) -> Self {
        match dialect {
            SourceDialect::Postgres => Self::postgres(),
            SourceDialect::Mssql => Self::mssql(),
        }
    }

    /// SQL Server DB-API type codes.
    #[must_use]
    pub fn mssql() -> Self {
        Self::from_pairs([
            (-7, TargetType::Boolean), // BIT
            (1, TargetType::Varchar { max_len: 256 }),
            (2, TargetType::Date),
            (3, TargetType::Integer),
            (4, TargetType::Timestamp),
            (
                5,
                TargetType::Decimal {
                    precision: 38,
                    scale: 20,
                },
            ),
        ])
    }

    /// Postgres type OIDs (`pg_type.oid`).
    #[must_use]
    pub fn postgres() -> Self {
        Self::from_pairs([
            (16, TargetType::Boolean),
            (20, TargetType::BigInt),
            (21, TargetType::SmallInt),
            (23, TargetType::Integer),
            (25, TargetType::Text),
            (700, TargetType::Real),
            (701, TargetType::Double),
            (1042, TargetType::Text),
            (1043, TargetType::Text),
            (1082, TargetType::Date),
            (1114, TargetType::Timestamp),
            (1184, TargetType::Timestamp),
            (
                1700,
                TargetType::Decimal {
                    precision: 38,
                    scale: 20,
                },
            ),
        ])
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (i64, TargetType)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(id, ty)| (SourceTypeId(id), ty))
                .collect(),
        }
    }

    /// Replace or add one entry.
    #[must_use]
    pub fn with_override(mut self, id: SourceTypeId, target: TargetType) -> Self {
        self.entries.insert(id, target);
        self
    }

    /// Look up a type id. Unknown ids map to [`TargetType::Text`].
    #[must_use]
    pub fn map(&self, id: SourceTypeId) -> TargetType {
        self.entries.get(&id).copied().unwrap_or(TargetType::Text)
    }

    /// Derive the staging schema from a chunk's declared columns, in order.
    #[must_use]
    pub fn schema_for(&self, chunk: &ChunkResult) -> SchemaRef {
        let fields: Vec<Field> = chunk
            .columns()
            .map(|(name, id)| Field::new(name, self.map(id).to_arrow(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::for_dialect(SourceDialect::default())
    }
}
