//! Decoding of column default expressions reported by catalog introspection.
//!
//! Only literal forms are understood. Function calls, sequence references
//! and user-defined expressions decode to `None`; their value depends on
//! the server and is never guessed.

use once_cell::sync::Lazy;
use regex::Regex;

/// A literal recovered from a default expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    Text(String),
    Bool(bool),
}

impl LiteralValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::Text(s) => Some(s),
            LiteralValue::Bool(_) => None,
        }
    }
}

/// The recognized literal forms, in match priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRule {
    /// `42`, `-1.5`, `(7)`
    Numeric,
    /// `'hello'::character varying`
    Character,
    /// `'\001'::bytea`
    Binary,
    /// `'2024-01-01'::date`
    DateTime,
    /// `'1 day'::interval`
    Interval,
    /// bare `true` / `false`
    Boolean,
    /// `'(1,2)'::point`
    Geometric,
    /// `'127.0.0.1'::inet`
    Network,
    /// `B'0101'::bit varying`
    BitString,
    /// `'<a/>'::xml`
    Xml,
    /// `'{1,2}'::integer[]`
    Array,
    /// bare object identifier
    ObjectId,
}

impl DefaultRule {
    pub const ALL: [DefaultRule; 12] = [
        DefaultRule::Numeric,
        DefaultRule::Character,
        DefaultRule::Binary,
        DefaultRule::DateTime,
        DefaultRule::Interval,
        DefaultRule::Boolean,
        DefaultRule::Geometric,
        DefaultRule::Network,
        DefaultRule::BitString,
        DefaultRule::Xml,
        DefaultRule::Array,
        DefaultRule::ObjectId,
    ];

    /// Applies this rule alone to `raw`.
    pub fn apply(self, raw: &str) -> Option<LiteralValue> {
        if self == DefaultRule::Boolean {
            return match raw {
                "true" => Some(LiteralValue::Bool(true)),
                "false" => Some(LiteralValue::Bool(false)),
                _ => None,
            };
        }

        let (_, re) = RULE_PATTERNS.iter().find(|(rule, _)| *rule == self)?;
        let caps = re.captures(raw)?;
        let value = caps.get(1).or_else(|| caps.get(0))?;
        Some(LiteralValue::Text(value.as_str().to_string()))
    }
}

static RULE_PATTERNS: Lazy<Vec<(DefaultRule, Regex)>> = Lazy::new(|| {
    [
        (DefaultRule::Numeric, r"\A\(?(-?\d+(?:\.\d*)?)\)?\z"),
        (
            DefaultRule::Character,
            r"(?s)\A\(?'(.*)'::.*\b(?:character varying|bpchar|text|varchar|char)(?:\(\d+\))?\z",
        ),
        (
            DefaultRule::Binary,
            r"(?s)\A'(.*)'::(?:bytea|varbinary|binary)(?:\(\d+\))?\z",
        ),
        (
            DefaultRule::DateTime,
            r"\A'(.+)'::(?:time(?:stamp)? with(?:out)? time zone|timestamptz|timestamp|timetz|time|date)\z",
        ),
        (DefaultRule::Interval, r"\A'(.*)'::interval\z"),
        (
            DefaultRule::Geometric,
            r#"\A'(.*)'::(?:point|line|lseg|box|"?path"?|polygon|circle)\z"#,
        ),
        (DefaultRule::Network, r"\A'(.*)'::(?:cidr|inet|macaddr)\z"),
        (DefaultRule::BitString, r#"\AB'(.*)'::"?bit(?: varying)?"?\z"#),
        (DefaultRule::Xml, r"(?s)\A'(.*)'::xml\z"),
        (DefaultRule::Array, r#"\A'(.*)'::"?\D+"?\[\]\z"#),
        (DefaultRule::ObjectId, r"\A-?\d+\z"),
    ]
    .into_iter()
    .map(|(rule, pattern)| {
        (
            rule,
            Regex::new(pattern).expect("default value pattern is valid"),
        )
    })
    .collect()
});

/// Decodes a raw default expression, returning the literal captured by the
/// first matching rule.
pub fn decode(raw_default: Option<&str>) -> Option<LiteralValue> {
    let raw = raw_default?;
    DefaultRule::ALL.iter().find_map(|rule| rule.apply(raw))
}
