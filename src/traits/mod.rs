mod driver;
mod statement;

pub use driver::DatabaseDriver;
pub use statement::SqlStatement;
