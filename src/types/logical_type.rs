use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Transport-assigned identifier of a result column's on-the-wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireTypeTag(pub u32);

impl WireTypeTag {
    pub const BOOLEAN: WireTypeTag = WireTypeTag(5);
    pub const INTEGER: WireTypeTag = WireTypeTag(6);
    pub const FLOAT: WireTypeTag = WireTypeTag(7);
    pub const CHAR: WireTypeTag = WireTypeTag(8);
    pub const VARCHAR: WireTypeTag = WireTypeTag(9);
    pub const DATE: WireTypeTag = WireTypeTag(10);
    pub const TIME: WireTypeTag = WireTypeTag(11);
    pub const TIMESTAMP: WireTypeTag = WireTypeTag(12);
    pub const TIMESTAMPTZ: WireTypeTag = WireTypeTag(13);
    pub const INTERVAL: WireTypeTag = WireTypeTag(14);
    pub const TIMETZ: WireTypeTag = WireTypeTag(15);
    pub const NUMERIC: WireTypeTag = WireTypeTag(16);
    pub const VARBINARY: WireTypeTag = WireTypeTag(17);
    pub const LONG_VARCHAR: WireTypeTag = WireTypeTag(115);
    pub const LONG_VARBINARY: WireTypeTag = WireTypeTag(116);
    pub const BINARY: WireTypeTag = WireTypeTag(117);
    pub const MONEY: WireTypeTag = WireTypeTag(790);

    /// The logical type this tag always maps to.
    pub fn logical_type(self) -> LogicalType {
        LogicalType::for_tag(self)
    }
}

impl fmt::Display for WireTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of value categories that coercion and quoting decide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Float,
    Decimal,
    Currency,
    String,
    Binary,
    Date,
    Time,
    Timestamp,
    Boolean,
    Xml,
    TsVector,
    Unknown,
}

static TAG_TABLE: &[(WireTypeTag, LogicalType)] = &[
    (WireTypeTag::BOOLEAN, LogicalType::Boolean),
    (WireTypeTag::INTEGER, LogicalType::Integer),
    (WireTypeTag::FLOAT, LogicalType::Float),
    (WireTypeTag::CHAR, LogicalType::String),
    (WireTypeTag::VARCHAR, LogicalType::String),
    (WireTypeTag::DATE, LogicalType::Date),
    (WireTypeTag::TIME, LogicalType::Time),
    (WireTypeTag::TIMESTAMP, LogicalType::Timestamp),
    (WireTypeTag::TIMESTAMPTZ, LogicalType::Timestamp),
    (WireTypeTag::INTERVAL, LogicalType::Unknown),
    (WireTypeTag::TIMETZ, LogicalType::Time),
    (WireTypeTag::NUMERIC, LogicalType::Decimal),
    (WireTypeTag::VARBINARY, LogicalType::Binary),
    (WireTypeTag::LONG_VARCHAR, LogicalType::String),
    (WireTypeTag::LONG_VARBINARY, LogicalType::Binary),
    (WireTypeTag::BINARY, LogicalType::Binary),
    (WireTypeTag::MONEY, LogicalType::Currency),
];

// Checked in order; the first match wins.
static SQL_TYPE_RULES: Lazy<Vec<(Regex, LogicalType)>> = Lazy::new(|| {
    [
        (r"^\D+\[\]$", LogicalType::String),
        (r"^(?:real|double precision|float\d*)(?:\(\d+\))?$", LogicalType::Float),
        (r"^money$", LogicalType::Currency),
        (r"^(?:numeric|decimal|number)(?:\(\d+(?:,\s*\d+)?\))?$", LogicalType::Decimal),
        (r"^bit(?: varying)?(?:\(\d+\))?$", LogicalType::String),
        (
            r"^(?:character varying|character|bpchar|long varchar|varchar|char|text)(?:\(\d+\))?$",
            LogicalType::String,
        ),
        (
            r"^(?:bytea|long varbinary|varbinary|binary|raw)(?:\(\d+\))?$",
            LogicalType::Binary,
        ),
        (
            r"^(?:timestamptz|timestamp|datetime|smalldatetime)(?:\(\d+\))?(?: with(?:out)? time zone)?$",
            LogicalType::Timestamp,
        ),
        (
            r"^(?:timetz|time)(?:\(\d+\))?(?: with(?:out)? time zone)?$",
            LogicalType::Time,
        ),
        (r"^date$", LogicalType::Date),
        (r"^bool(?:ean)?$", LogicalType::Boolean),
        (r"^interval", LogicalType::String),
        (r#"^(?:point|line|lseg|box|"?path"?|polygon|circle)$"#, LogicalType::String),
        (r"^(?:cidr|inet|macaddr)$", LogicalType::String),
        (r"^xml$", LogicalType::Xml),
        (r"^tsvector$", LogicalType::TsVector),
        (r"^oid$", LogicalType::Integer),
        (r"^uuid$", LogicalType::String),
        (r"^(?:tinyint|smallint|integer|bigint|int\d*)$", LogicalType::Integer),
    ]
    .into_iter()
    .map(|(pattern, ty)| {
        (
            Regex::new(&format!("(?i){pattern}")).expect("sql type pattern is valid"),
            ty,
        )
    })
    .collect()
});

impl LogicalType {
    /// Looks up the static tag table; unmapped tags are `Unknown`.
    pub fn for_tag(tag: WireTypeTag) -> LogicalType {
        TAG_TABLE
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, ty)| *ty)
            .unwrap_or(LogicalType::Unknown)
    }

    /// Maps a catalog type name such as `varchar(80)` or
    /// `timestamp with time zone` to its logical type.
    pub fn from_sql_type(sql_type: &str) -> LogicalType {
        let sql_type = sql_type.trim();
        SQL_TYPE_RULES
            .iter()
            .find(|(re, _)| re.is_match(sql_type))
            .map(|(_, ty)| *ty)
            .unwrap_or(LogicalType::Unknown)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Integer => "integer",
            LogicalType::Float => "float",
            LogicalType::Decimal => "decimal",
            LogicalType::Currency => "currency",
            LogicalType::String => "string",
            LogicalType::Binary => "binary",
            LogicalType::Date => "date",
            LogicalType::Time => "time",
            LogicalType::Timestamp => "timestamp",
            LogicalType::Boolean => "boolean",
            LogicalType::Xml => "xml",
            LogicalType::TsVector => "tsvector",
            LogicalType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
