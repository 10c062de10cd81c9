//! Rendering of values as SQL literal text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bytea::escape_bytea;
use crate::error::{Result, VtRsError};
use crate::schema::ColumnDescriptor;
use crate::types::{LogicalType, SqlValue, ValueKind};

pub use crate::identifier::{quote_identifier, quote_table_name};

static DECIMAL_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)$").expect("decimal pattern is valid"));
static BIT_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[01]+$").expect("bit pattern is valid"));
static HEX_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]+$").expect("hex pattern is valid"));

/// How a value is rendered for a particular column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteRule {
    /// The value's own literal form, regardless of the column.
    Generic,
    /// `'infinity'` / `'-infinity'` for infinite floats.
    TimestampInfinity,
    /// The number as a quoted string, without numeric escaping.
    CurrencyBare,
    /// Escaped as binary, then quoted.
    BinaryEscape,
    /// Prefixed with the `xml` type tag.
    XmlTagged,
    /// `B'0101'` or `X'1F'` notation.
    BitString,
    /// The value cannot be meaningfully stored in the column.
    Unsupported,
}

impl QuoteRule {
    pub fn for_value(kind: ValueKind, column: &ColumnDescriptor) -> QuoteRule {
        use LogicalType as L;

        match kind {
            ValueKind::Null => QuoteRule::Generic,
            ValueKind::Bool => match column.logical_type {
                L::Integer
                | L::Float
                | L::Decimal
                | L::Currency
                | L::String
                | L::Binary
                | L::Date
                | L::Time
                | L::Timestamp
                | L::Boolean
                | L::Xml
                | L::TsVector
                | L::Unknown => QuoteRule::Generic,
            },
            ValueKind::Integer | ValueKind::Decimal => match column.logical_type {
                L::Currency => QuoteRule::CurrencyBare,
                L::Integer
                | L::Float
                | L::Decimal
                | L::String
                | L::Binary
                | L::Date
                | L::Time
                | L::Timestamp
                | L::Boolean
                | L::Xml
                | L::TsVector
                | L::Unknown => QuoteRule::Generic,
            },
            // Only infinite floats get the timestamp form; finite ones are generic.
            ValueKind::Float => match column.logical_type {
                L::Timestamp => QuoteRule::TimestampInfinity,
                L::Currency => QuoteRule::CurrencyBare,
                L::Integer
                | L::Float
                | L::Decimal
                | L::String
                | L::Binary
                | L::Date
                | L::Time
                | L::Boolean
                | L::Xml
                | L::TsVector
                | L::Unknown => QuoteRule::Generic,
            },
            ValueKind::Text => match column.logical_type {
                L::Binary => QuoteRule::BinaryEscape,
                L::Xml => QuoteRule::XmlTagged,
                L::String | L::Unknown if column.is_bit_string() => QuoteRule::BitString,
                L::Integer
                | L::Float
                | L::Decimal
                | L::Currency
                | L::String
                | L::Date
                | L::Time
                | L::Timestamp
                | L::Boolean
                | L::TsVector
                | L::Unknown => QuoteRule::Generic,
            },
            ValueKind::Bytes => match column.logical_type {
                L::Binary | L::String | L::Unknown => QuoteRule::Generic,
                L::Integer
                | L::Float
                | L::Decimal
                | L::Currency
                | L::Date
                | L::Time
                | L::Timestamp
                | L::Boolean
                | L::Xml
                | L::TsVector => QuoteRule::Unsupported,
            },
            ValueKind::Date => match column.logical_type {
                L::Integer
                | L::Float
                | L::Decimal
                | L::Currency
                | L::String
                | L::Binary
                | L::Date
                | L::Time
                | L::Timestamp
                | L::Boolean
                | L::Xml
                | L::TsVector
                | L::Unknown => QuoteRule::Generic,
            },
        }
    }
}

/// Quotes `value` for use in SQL text, taking the target column's type into
/// account when it is known.
pub fn quote(value: &SqlValue, column: Option<&ColumnDescriptor>) -> Result<String> {
    let Some(column) = column else {
        return quote_generic(value);
    };

    match QuoteRule::for_value(value.kind(), column) {
        QuoteRule::Generic => quote_generic(value),
        QuoteRule::TimestampInfinity => match value {
            SqlValue::Float(f) if f.is_infinite() && f.is_sign_positive() => {
                Ok("'infinity'".to_string())
            }
            SqlValue::Float(f) if f.is_infinite() => Ok("'-infinity'".to_string()),
            _ => quote_generic(value),
        },
        QuoteRule::CurrencyBare => match value {
            SqlValue::Int32(i) => Ok(format!("'{i}'")),
            SqlValue::Int64(i) => Ok(format!("'{i}'")),
            SqlValue::Float(f) if f.is_finite() => Ok(format!("'{f}'")),
            SqlValue::Decimal(d) => Ok(format!("'{}'", checked_decimal(d)?)),
            _ => Err(unsupported(value, column)),
        },
        QuoteRule::BinaryEscape => match value {
            SqlValue::Text(s) => Ok(quote_string(&escape_bytea(s.as_bytes()))),
            _ => Err(unsupported(value, column)),
        },
        QuoteRule::XmlTagged => match value {
            SqlValue::Text(s) => Ok(format!("xml {}", quote_string(s))),
            _ => Err(unsupported(value, column)),
        },
        QuoteRule::BitString => match value {
            SqlValue::Text(s) => quote_bit_string(s),
            _ => Err(unsupported(value, column)),
        },
        QuoteRule::Unsupported => Err(unsupported(value, column)),
    }
}

/// Literal form of a value with no column information.
pub fn quote_generic(value: &SqlValue) -> Result<String> {
    let quoted = match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "'t'".to_string(),
        SqlValue::Bool(false) => "'f'".to_string(),
        SqlValue::Int32(i) => i.to_string(),
        SqlValue::Int64(i) => i.to_string(),
        SqlValue::Float(f) if f.is_nan() => "'NaN'".to_string(),
        SqlValue::Float(f) if f.is_infinite() && f.is_sign_positive() => "'Infinity'".to_string(),
        SqlValue::Float(f) if f.is_infinite() => "'-Infinity'".to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Decimal(d) => checked_decimal(d)?.to_string(),
        SqlValue::Text(s) => quote_string(s),
        SqlValue::Bytes(b) => quote_string(&escape_bytea(b)),
        SqlValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
    };
    Ok(quoted)
}

/// Wraps `s` in single quotes, doubling any embedded single quote.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

fn quote_bit_string(s: &str) -> Result<String> {
    if BIT_DIGITS.is_match(s) {
        Ok(format!("B'{s}'"))
    } else if HEX_DIGITS.is_match(s) {
        Ok(format!("X'{s}'"))
    } else {
        Err(VtRsError::malformed("bit string", s))
    }
}

fn checked_decimal(d: &str) -> Result<&str> {
    if DECIMAL_TEXT.is_match(d) {
        Ok(d)
    } else {
        Err(VtRsError::malformed(LogicalType::Decimal, d))
    }
}

fn unsupported(value: &SqlValue, column: &ColumnDescriptor) -> VtRsError {
    VtRsError::UnsupportedQuote {
        value: value.kind().to_string(),
        column: column.logical_type.to_string(),
    }
}

/// Converts a bind value to the representation the column expects on the
/// wire. Text bound to a binary column travels as raw bytes.
pub fn type_cast(value: SqlValue, column: Option<&ColumnDescriptor>) -> SqlValue {
    match (value, column) {
        (SqlValue::Text(s), Some(c)) if c.logical_type == LogicalType::Binary => {
            SqlValue::Bytes(s.into_bytes())
        }
        (value, _) => value,
    }
}
