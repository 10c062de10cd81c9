use crate::types::SqlValue;

/// SQL produced by an external query generator.
///
/// The adapter never builds DML itself; anything that can render dialect
/// SQL text plus its positional bind values can be executed through
/// [`VerticaAdapter::exec_statement`](crate::VerticaAdapter::exec_statement).
pub trait SqlStatement {
    fn to_sql(&self) -> String;

    fn binds(&self) -> Vec<SqlValue> {
        Vec::new()
    }
}

impl SqlStatement for str {
    fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl SqlStatement for String {
    fn to_sql(&self) -> String {
        self.clone()
    }
}

impl<S: AsRef<str>> SqlStatement for (S, Vec<SqlValue>) {
    fn to_sql(&self) -> String {
        self.0.as_ref().to_string()
    }

    fn binds(&self) -> Vec<SqlValue> {
        self.1.clone()
    }
}
