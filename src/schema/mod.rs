mod column;
pub mod default_value;
pub mod statements;

pub use column::{build_column, ColumnDescriptor, MONEY_PRECISION, MONEY_SCALE};
pub use default_value::{DefaultRule, LiteralValue};
pub use statements::{type_to_sql, ColumnOptions, ColumnType};
