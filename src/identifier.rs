//! Schema-qualified name handling.
//!
//! Understands the reference forms the server accepts:
//!
//! * `table_name`
//! * `"table.name"`
//! * `schema_name.table_name`
//! * `schema_name."table.name"`
//! * `"schema.name"."table name"`

use once_cell::sync::Lazy;
use regex::Regex;

// An identifier part is either a double-quoted run or a maximal run of
// characters that are not a dot, a quote or whitespace.
static IDENTIFIER_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^".\s]+|"[^"]*""#).expect("identifier pattern is valid"));

/// Splits a possibly-quoted reference into `(schema, table)`.
///
/// Surrounding quotes are stripped from both parts. Only the first two
/// parts are recognized; a single part is a bare table name and the schema
/// is left for the caller to default from the search path.
pub fn split_schema_and_table(raw_name: &str) -> (Option<String>, String) {
    let mut parts = IDENTIFIER_PART
        .find_iter(raw_name)
        .take(2)
        .map(|m| strip_quotes(m.as_str()).to_string());

    match (parts.next(), parts.next()) {
        (Some(schema), Some(table)) => (Some(schema), table),
        (Some(table), None) => (None, table),
        _ => (None, String::new()),
    }
}

fn strip_quotes(part: &str) -> &str {
    let part = part.strip_prefix('"').unwrap_or(part);
    part.strip_suffix('"').unwrap_or(part)
}

/// Wraps `name` in double quotes, doubling any embedded quote.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Quotes each part of a possibly schema-qualified table reference.
pub fn quote_table_name(name: &str) -> String {
    match split_schema_and_table(name) {
        (Some(schema), table) => format!(
            "{}.{}",
            quote_identifier(&schema),
            quote_identifier(&table)
        ),
        (None, table) => quote_identifier(&table),
    }
}
