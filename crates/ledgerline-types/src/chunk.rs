//! One query result as returned by a source connection.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Source-dialect column type identifier.
///
/// For Postgres sources this is the type OID; for SQL Server DB-API
/// drivers it is the driver's small integer type code (which may be
/// negative, e.g. `-7` for `BIT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTypeId(pub i64);

impl std::fmt::Display for SourceTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SourceTypeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A single cell as decoded from the source driver.
///
/// Decimals travel as their canonical text form so no precision is
/// lost before the staging store casts them to the target scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl CellValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(v) | Self::Text(v) => f.write_str(v),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

/// Column metadata plus rows for one extracted window.
///
/// Every chunk of the same table is expected to carry the same
/// `column_names` and `column_source_types`, ordinal by ordinal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub column_names: Vec<String>,
    pub column_source_types: Vec<SourceTypeId>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ChunkResult {
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.column_names.len()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Iterate `(name, type id)` pairs in declared order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, SourceTypeId)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.column_source_types.iter().copied())
    }
}
