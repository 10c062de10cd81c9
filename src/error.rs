use thiserror::Error;

/// SQLSTATE the server reports when a prepared statement's result shape
/// changed underneath a cached plan.
pub const FEATURE_NOT_SUPPORTED: &str = "0A000";

/// Error type for vtrs operations
#[derive(Debug, Clone, Error)]
pub enum VtRsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport-level failure: dropped connection, protocol violation or a
    /// server-side error. `code` is the SQLSTATE when the server sent one.
    #[error("Query failed: {message}")]
    QueryFailed {
        code: Option<String>,
        message: String,
    },

    #[error("Prepared statement {statement} is stale: {message}")]
    StalePlan { statement: String, message: String },

    #[error("Malformed {expected} literal: {value:?}")]
    MalformedLiteral { expected: String, value: String },

    #[error("Cannot quote a {value} value for a {column} column")]
    UnsupportedQuote { value: String, column: String },

    #[error("Statement cache holds {len} entries, exceeding its bound of {max}")]
    CapacityInvariant { len: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid column type: {0}")]
    InvalidColumnType(String),

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),
}

impl VtRsError {
    /// A transport failure without a server SQLSTATE.
    pub fn query(message: impl Into<String>) -> Self {
        VtRsError::QueryFailed {
            code: None,
            message: message.into(),
        }
    }

    /// A server error carrying a SQLSTATE.
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        VtRsError::QueryFailed {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn malformed(expected: impl ToString, value: impl Into<String>) -> Self {
        VtRsError::MalformedLiteral {
            expected: expected.to_string(),
            value: value.into(),
        }
    }

    /// The server SQLSTATE, if this error came from the server.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            VtRsError::QueryFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when the server rejected a prepared statement because the plan
    /// it was built against no longer matches the schema.
    pub fn is_stale_plan(&self) -> bool {
        self.sqlstate() == Some(FEATURE_NOT_SUPPORTED)
    }
}

/// Result type alias for vtrs operations
pub type Result<T> = std::result::Result<T, VtRsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_plan_detection() {
        assert!(VtRsError::server("0A000", "cached plan must not change result type").is_stale_plan());
        assert!(!VtRsError::server("42P01", "relation does not exist").is_stale_plan());
        assert!(!VtRsError::query("connection reset").is_stale_plan());
        assert!(!VtRsError::ColumnNotFound("id".into()).is_stale_plan());
    }
}
