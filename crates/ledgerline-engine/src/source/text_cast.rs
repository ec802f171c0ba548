//! Text casts for Postgres columns without a native decoder.
//!
//! A column whose type is not decoded natively is re-selected as
//! `"col"::text` from the user's query wrapped as a subquery. The chunk
//! still reports the column's original OID, so the type map sees the
//! real type (and falls back to text for unknown ones).

use pg_escape::quote_identifier;

/// Returns `true` if the type must be read through a `::text` cast.
///
/// `numeric` is read as text as well and becomes a decimal cell, which
/// keeps its exact digits.
pub(crate) fn needs_text_cast(pg_type: &str) -> bool {
    !matches!(
        pg_type,
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "float4"
            | "float8"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
            | "date"
            | "timestamp"
            | "timestamptz"
    )
}

/// Wrap `query` so every column needing a cast comes back as text.
///
/// `columns` holds each result column's name and type name in order.
/// Returns `None` when no column needs a cast. Positional parameters
/// (`$1`, `$2`) keep working inside the subquery.
pub(crate) fn wrap_with_text_casts<'a>(
    query: &str,
    columns: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    let mut any_cast = false;
    let select_list = columns
        .into_iter()
        .map(|(name, pg_type)| {
            let ident = quote_identifier(name);
            if needs_text_cast(pg_type) {
                any_cast = true;
                format!("{ident}::text AS {ident}")
            } else {
                ident.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    if !any_cast {
        return None;
    }
    let inner = query.trim().trim_end_matches(';').trim_end();
    Some(format!("SELECT {select_list} FROM ({inner}) AS q"))
}
