//! DDL statement text.

use crate::error::{Result, VtRsError};
use crate::identifier::{quote_identifier, quote_table_name};
use crate::quoting::quote;
use crate::types::SqlValue;

/// Longest varchar the server accepts.
pub const MAX_VARCHAR_LENGTH: u32 = 65_000;
/// Largest binary column, in bytes.
pub const MAX_BINARY_LENGTH: u32 = 0x3fff_ffff;

/// Abstract column types accepted by the DDL helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    PrimaryKey,
    String,
    Text,
    Integer,
    Float,
    Decimal,
    DateTime,
    Timestamp,
    Time,
    Date,
    Binary,
    Boolean,
    Xml,
    TsVector,
    /// A server type name used verbatim.
    Raw(String),
}

/// Optional column attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    pub limit: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub default: Option<SqlValue>,
    pub null: Option<bool>,
}

impl ColumnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.null = Some(null);
        self
    }
}

/// Maps an abstract column type to the server's type name.
pub fn type_to_sql(
    ty: &ColumnType,
    limit: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
) -> Result<String> {
    let sql = match ty {
        ColumnType::PrimaryKey => "identity primary key".to_string(),
        ColumnType::String => format!("varchar({})", limit.unwrap_or(255)),
        ColumnType::Text => match limit {
            None => format!("varchar({MAX_VARCHAR_LENGTH})"),
            Some(n) if n <= MAX_VARCHAR_LENGTH => format!("varchar({n})"),
            Some(_) => {
                return Err(VtRsError::InvalidColumnType(format!(
                    "the limit on varchar is at most {MAX_VARCHAR_LENGTH} bytes"
                )))
            }
        },
        ColumnType::Integer => match limit {
            None | Some(3..=4) => "integer".to_string(),
            Some(1..=2) => "smallint".to_string(),
            Some(5..=8) => "bigint".to_string(),
            Some(n) => {
                return Err(VtRsError::InvalidColumnType(format!(
                    "no integer type has byte size {n}; use a numeric with precision 0 instead"
                )))
            }
        },
        ColumnType::Float => "float".to_string(),
        ColumnType::Decimal => match (precision, scale) {
            (Some(p), Some(s)) => format!("decimal({p},{s})"),
            (Some(p), None) => format!("decimal({p})"),
            _ => "decimal".to_string(),
        },
        ColumnType::DateTime | ColumnType::Timestamp => "timestamp".to_string(),
        ColumnType::Time => "time".to_string(),
        ColumnType::Date => "date".to_string(),
        ColumnType::Binary => match limit {
            None | Some(0) => "bytea".to_string(),
            Some(n) if n <= MAX_BINARY_LENGTH => "bytea".to_string(),
            Some(n) => {
                return Err(VtRsError::InvalidColumnType(format!(
                    "no binary type has byte size {n}"
                )))
            }
        },
        ColumnType::Boolean => "boolean".to_string(),
        ColumnType::Xml => "xml".to_string(),
        ColumnType::TsVector => "tsvector".to_string(),
        ColumnType::Raw(name) => name.clone(),
    };
    Ok(sql)
}

pub fn rename_table(table: &str, new_name: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_table_name(table),
        quote_identifier(new_name)
    )
}

pub fn add_column(
    table: &str,
    column: &str,
    ty: &ColumnType,
    options: &ColumnOptions,
) -> Result<String> {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_table_name(table),
        quote_identifier(column),
        type_to_sql(ty, options.limit, options.precision, options.scale)?
    );
    if let Some(default) = &options.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&quote(default, None)?);
    }
    if options.null == Some(false) {
        sql.push_str(" NOT NULL");
    }
    Ok(sql)
}

pub fn change_column(
    table: &str,
    column: &str,
    ty: &ColumnType,
    options: &ColumnOptions,
) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE {}",
        quote_table_name(table),
        quote_identifier(column),
        type_to_sql(ty, options.limit, options.precision, options.scale)?
    ))
}

pub fn change_column_default(table: &str, column: &str, default: &SqlValue) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
        quote_table_name(table),
        quote_identifier(column),
        quote(default, None)?
    ))
}

/// Backfills NULLs with `default` before forbidding them, when both apply.
pub fn change_column_null(
    table: &str,
    column: &str,
    null: bool,
    default: Option<&SqlValue>,
) -> Result<Vec<String>> {
    let table = quote_table_name(table);
    let column = quote_identifier(column);
    let mut statements = Vec::with_capacity(2);

    if let (false, Some(default)) = (null, default.filter(|d| !d.is_null())) {
        statements.push(format!(
            "UPDATE {table} SET {column}={} WHERE {column} IS NULL",
            quote(default, None)?
        ));
    }
    statements.push(format!(
        "ALTER TABLE {table} ALTER COLUMN {column} {} NOT NULL",
        if null { "DROP" } else { "SET" }
    ));
    Ok(statements)
}

pub fn rename_column(table: &str, column: &str, new_name: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_table_name(table),
        quote_identifier(column),
        quote_identifier(new_name)
    )
}

pub fn remove_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {} CASCADE",
        quote_table_name(table),
        quote_identifier(column)
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_table_name(table))
}

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_identifier(name))
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_identifier(name))
}

pub fn session_authorization(user: &str) -> String {
    format!("SET SESSION AUTHORIZATION {}", quote_identifier(user))
}
