//! Conversion of raw result cells into typed values.
//!
//! Cells come off the wire in text form. For each column the wire type tag
//! picks one conversion, planned once per result set and then applied to the
//! affected column indices only. Boolean, time and timestamp columns keep
//! their text rendering.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::bytea::unescape_bytea;
use crate::error::{Result, VtRsError};
use crate::types::{LogicalType, Value, WireTypeTag};

// $12,345,678.12
static CURRENCY_DOT_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\D+[\d,]+\.\d{2}$").expect("currency pattern is valid"));
// $12.345.678,12
static CURRENCY_COMMA_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\D+[\d.]+,\d{2}$").expect("currency pattern is valid"));
static NOT_NUMERIC_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^-\d.]").expect("currency pattern is valid"));
static NOT_NUMERIC_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^-\d,]").expect("currency pattern is valid"));

/// The conversion applied to every cell of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Binary,
    Integer,
    Float,
    Date,
    Text,
    Currency,
}

impl Coercion {
    /// The conversion for a logical type, or `None` when cells pass through.
    pub fn for_logical_type(logical_type: LogicalType) -> Option<Coercion> {
        match logical_type {
            LogicalType::Binary => Some(Coercion::Binary),
            LogicalType::Integer => Some(Coercion::Integer),
            LogicalType::Float | LogicalType::Decimal => Some(Coercion::Float),
            LogicalType::Date => Some(Coercion::Date),
            LogicalType::String => Some(Coercion::Text),
            LogicalType::Currency => Some(Coercion::Currency),
            LogicalType::Time
            | LogicalType::Timestamp
            | LogicalType::Boolean
            | LogicalType::Xml
            | LogicalType::TsVector
            | LogicalType::Unknown => None,
        }
    }

    /// Converts one cell in place. Nulls and cells already holding the
    /// target representation are left alone.
    pub fn apply(self, cell: &mut Value) -> Result<()> {
        let converted = match (self, &*cell) {
            (_, Value::Null) => return Ok(()),
            (Coercion::Binary, Value::Text(s)) => Value::Bytes(unescape_bytea(s)?),
            (Coercion::Integer, Value::Text(s)) => Value::Integer(parse_integer(s)?),
            (Coercion::Float, Value::Text(s)) => Value::Float(parse_float(s)?),
            (Coercion::Float, Value::Integer(i)) => Value::Float(*i as f64),
            (Coercion::Date, Value::Text(s)) => Value::Date(parse_date(s)?),
            (Coercion::Text, Value::Bytes(b)) => Value::Text(
                String::from_utf8(b.clone())
                    .map_err(|_| VtRsError::malformed(LogicalType::String, hex::encode(b)))?,
            ),
            (Coercion::Currency, Value::Text(s)) => match normalize_currency(s) {
                Some(normalized) => Value::Text(normalized),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        *cell = converted;
        Ok(())
    }
}

/// Per-column conversion plan for one result set.
#[derive(Debug, Clone, Default)]
pub struct CoercionPlan {
    columns: Vec<(usize, Coercion)>,
}

impl CoercionPlan {
    /// Resolves each column's conversion once, from its wire type tag.
    pub fn new(types: &[WireTypeTag]) -> Self {
        let columns = types
            .iter()
            .enumerate()
            .filter_map(|(i, tag)| Coercion::for_logical_type(tag.logical_type()).map(|c| (i, c)))
            .collect();
        Self { columns }
    }

    /// True when no column needs converting.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[(usize, Coercion)] {
        &self.columns
    }

    /// Applies the plan to every row. The first cell that fails to parse
    /// aborts the whole pass.
    pub fn apply(&self, rows: &mut [Vec<Value>]) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        for row in rows.iter_mut() {
            for &(index, coercion) in &self.columns {
                if let Some(cell) = row.get_mut(index) {
                    coercion.apply(cell)?;
                }
            }
        }
        Ok(())
    }
}

/// Coerces `rows` in place according to the per-column wire types.
pub fn coerce_rows(rows: &mut [Vec<Value>], types: &[WireTypeTag]) -> Result<()> {
    CoercionPlan::new(types).apply(rows)
}

fn parse_integer(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| VtRsError::malformed(LogicalType::Integer, s))
}

fn parse_float(s: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| VtRsError::malformed(LogicalType::Float, s))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| VtRsError::malformed(LogicalType::Date, s))
}

/// Strips currency symbols and thousands separators from a locale
/// formatted money value.
///
/// Returns `None` when the value matches neither known layout; such values
/// are passed through untouched.
pub fn normalize_currency(data: &str) -> Option<String> {
    if CURRENCY_DOT_DECIMAL.is_match(data) {
        return Some(NOT_NUMERIC_DOT.replace_all(data, "").into_owned());
    }
    if CURRENCY_COMMA_DECIMAL.is_match(data) {
        let stripped = NOT_NUMERIC_COMMA.replace_all(data, "");
        return Some(stripped.replacen(',', ".", 1));
    }
    None
}
