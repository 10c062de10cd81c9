use crate::error::{Result, VtRsError};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5433;
pub const DEFAULT_STATEMENT_LIMIT: usize = 1000;

/// Connection and adapter settings.
///
/// # Example
/// ```
/// use vtrs::AdapterConfig;
///
/// let config = AdapterConfig::new("analytics")
///     .host("db.internal")
///     .username("etl")
///     .schema_search_path("staging,public")
///     .statement_limit(200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    /// Comma-separated schema names applied with `SET search_path`.
    pub schema_search_path: Option<String>,
    /// When false every statement runs unprepared.
    pub prepared_statements: bool,
    /// Capacity of the prepared statement cache; 0 disables it.
    pub statement_limit: usize,
    pub time_zone: Option<String>,
}

impl AdapterConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            database: database.into(),
            schema_search_path: None,
            prepared_statements: true,
            statement_limit: DEFAULT_STATEMENT_LIMIT,
            time_zone: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn schema_search_path(mut self, schema_csv: impl Into<String>) -> Self {
        self.schema_search_path = Some(schema_csv.into());
        self
    }

    pub fn prepared_statements(mut self, enabled: bool) -> Self {
        self.prepared_statements = enabled;
        self
    }

    pub fn statement_limit(mut self, limit: usize) -> Self {
        self.statement_limit = limit;
        self
    }

    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(VtRsError::InvalidConfig("database name is required".into()));
        }
        if self.host.trim().is_empty() {
            return Err(VtRsError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(VtRsError::InvalidConfig("port must be non-zero".into()));
        }
        Ok(())
    }

    /// Render a key/value connection string.
    pub fn to_connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", escape_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", escape_value(&self.database)),
        ];
        if let Some(user) = &self.username {
            parts.push(format!("user={}", escape_value(user)));
        }
        if let Some(password) = &self.password {
            parts.push(format!("password={}", escape_value(password)));
        }
        parts.join(" ")
    }
}

fn escape_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::new("db");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5433);
        assert!(config.prepared_statements);
        assert_eq!(config.statement_limit, 1000);
        assert!(config.schema_search_path.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(AdapterConfig::new("db").validate().is_ok());
        assert!(matches!(
            AdapterConfig::new("  ").validate(),
            Err(VtRsError::InvalidConfig(_))
        ));
        assert!(AdapterConfig::new("db").port(0).validate().is_err());
    }

    #[test]
    fn test_connection_string() {
        let config = AdapterConfig::new("sales")
            .host("vertica.local")
            .username("etl")
            .password("it's secret");
        assert_eq!(
            config.to_connection_string(),
            "host=vertica.local port=5433 dbname=sales user=etl password='it\\'s secret'"
        );
    }
}
