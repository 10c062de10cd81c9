//! vtrs - A Vertica connection adapter with a prepared statement cache
//!
//! # Example
//! ```ignore
//! use vtrs::{AdapterConfig, SqlValue, VerticaAdapter};
//!
//! // Connect to database
//! let config = AdapterConfig::new("analytics").schema_search_path("public");
//! let mut adapter = VerticaAdapter::connect(config).await?;
//!
//! // Statements with bind values are prepared once and reused
//! let row = adapter
//!     .exec("SELECT id, price FROM orders WHERE id = $1", &[SqlValue::Int64(42)])
//!     .await?
//!     .single_row()?;
//!
//! let id = row.get("id")?.as_i64();
//! let price = row.get("price")?.as_str();
//! ```

pub mod bytea;
pub mod coercion;
pub mod drivers;
pub mod error;
pub mod explain;
pub mod identifier;
pub mod quoting;
pub mod schema;
pub mod statement_cache;
pub mod traits;
pub mod types;

mod adapter;
mod config;

// Re-export main types for convenient access
pub use adapter::VerticaAdapter;
pub use config::AdapterConfig;
pub use error::{Result, VtRsError};
pub use schema::{build_column, ColumnDescriptor, ColumnOptions, ColumnType, LiteralValue};
pub use statement_cache::{CacheKey, ScopeId, StatementCache, StatementHandle};
pub use traits::{DatabaseDriver, SqlStatement};
pub use types::{LogicalType, QueryResult, RawQueryResult, Row, SqlValue, Value, WireTypeTag};
