use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::default_value::{self, LiteralValue};
use crate::types::LogicalType;

/// Fixed precision of the money type.
pub const MONEY_PRECISION: u32 = 19;
/// Fixed scale of the money type.
pub const MONEY_SCALE: u32 = 2;

static INTEGER_FAMILY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:integer|int|int8|bigint|smallint|tinyint)\b").expect("pattern is valid")
});
static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d+)(?:,\s*(\d+))?\)").expect("pattern is valid"));
static BIT_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^bit\b").expect("pattern is valid"));

/// A column as reported by table introspection.
/// Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// The catalog type name, e.g. `varchar(80)`.
    pub sql_type: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub default: Option<LiteralValue>,
    pub limit: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl ColumnDescriptor {
    /// Builds a descriptor from the raw introspection tuple.
    pub fn new(name: &str, sql_type: &str, default_text: Option<&str>, nullable: bool) -> Self {
        let logical_type = LogicalType::from_sql_type(sql_type);
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            logical_type,
            nullable,
            default: default_value::decode(default_text),
            limit: extract_limit(sql_type),
            precision: extract_precision(sql_type, logical_type),
            scale: extract_scale(sql_type, logical_type),
        }
    }

    /// A descriptor with no catalog information beyond its logical type.
    pub fn of_type(name: &str, logical_type: LogicalType) -> Self {
        Self {
            name: name.to_string(),
            sql_type: logical_type.to_string(),
            logical_type,
            nullable: true,
            default: None,
            limit: None,
            precision: None,
            scale: None,
        }
    }

    /// True for `bit` and `bit varying` columns.
    pub fn is_bit_string(&self) -> bool {
        BIT_STRING.is_match(self.sql_type.trim())
    }
}

/// Every integer family type is stored as 64 bits.
fn extract_limit(sql_type: &str) -> Option<u32> {
    if INTEGER_FAMILY.is_match(sql_type) {
        return Some(8);
    }
    PARENTHESIZED
        .captures(sql_type)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_precision(sql_type: &str, logical_type: LogicalType) -> Option<u32> {
    match logical_type {
        LogicalType::Currency => Some(MONEY_PRECISION),
        LogicalType::Decimal => PARENTHESIZED
            .captures(sql_type)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn extract_scale(sql_type: &str, logical_type: LogicalType) -> Option<u32> {
    match logical_type {
        LogicalType::Currency => Some(MONEY_SCALE),
        LogicalType::Decimal => PARENTHESIZED
            .captures(sql_type)
            .and_then(|caps| caps.get(2))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

/// Builds a column descriptor from `(column_name, type_name, default_text, nullable)`.
pub fn build_column(
    name: &str,
    sql_type: &str,
    default_text: Option<&str>,
    nullable: bool,
) -> ColumnDescriptor {
    ColumnDescriptor::new(name, sql_type, default_text, nullable)
}
