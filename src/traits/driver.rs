use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// Trait for the connection transport underneath an adapter.
/// Drivers are responsible for:
/// - Holding exactly one physical connection
/// - Converting SqlValue parameters to native types
/// - Executing statements and converting results to RawQueryResult
/// - Keeping server-side prepared statements addressable by name
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Execute a SQL statement with the given parameters.
    /// Parameters use positional placeholders ($1, $2, etc.)
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Prepare `sql` on the server under `name`.
    async fn prepare(&self, name: &str, sql: &str) -> Result<()>;

    /// Execute the statement previously prepared under `name`.
    async fn execute_prepared(&self, name: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Release the server-side statement `name`.
    async fn deallocate(&self, name: &str) -> Result<()> {
        self.execute(&format!("DEALLOCATE {name}"), &[]).await?;
        Ok(())
    }

    /// Cheap liveness check; must not fail.
    async fn is_alive(&self) -> bool;

    /// Drop and re-establish the physical connection.
    async fn reset(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
