mod logical_type;
mod row;
mod sql_value;
mod value;

pub use logical_type::{LogicalType, WireTypeTag};
pub use row::{QueryResult, RawQueryResult, Row};
pub use sql_value::{SqlValue, ValueKind};
pub use value::Value;
