//! DDL generation for target tables.

use arrow::datatypes::{DataType, Schema};
use pg_escape::quote_identifier;

/// Postgres column type for a staged Arrow type.
#[must_use]
pub fn arrow_to_pg_type(dt: &DataType) -> String {
    match dt {
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INTEGER".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "REAL".into(),
        DataType::Float64 => "DOUBLE PRECISION".into(),
        DataType::Decimal128(precision, scale) => format!("NUMERIC({precision},{scale})"),
        DataType::Date32 => "DATE".into(),
        DataType::Timestamp(_, None) => "TIMESTAMP".into(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ".into(),
        DataType::Binary | DataType::LargeBinary => "BYTEA".into(),
        _ => "TEXT".into(),
    }
}

/// Schema-qualified, quoted table reference.
#[must_use]
pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// `CREATE TABLE` statement with one column per field, in field order.
#[must_use]
pub fn create_table_sql(target_schema: &str, table: &str, arrow_schema: &Schema) -> String {
    let columns_ddl: Vec<String> = arrow_schema
        .fields()
        .iter()
        .map(|field| {
            let pg_type = arrow_to_pg_type(field.data_type());
            let nullable = if field.is_nullable() { "" } else { " NOT NULL" };
            format!("{} {}{}", quote_identifier(field.name()), pg_type, nullable)
        })
        .collect();

    format!(
        "CREATE TABLE {} ({})",
        qualified_table(target_schema, table),
        columns_ddl.join(", ")
    )
}
