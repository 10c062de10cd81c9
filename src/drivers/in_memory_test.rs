use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, VtRsError};
use crate::traits::DatabaseDriver;
use crate::types::{RawQueryResult, SqlValue, Value, WireTypeTag};

/// SQLSTATE for a statement name the server does not know.
const INVALID_SQL_STATEMENT_NAME: &str = "26000";

/// Which transport entry point a recorded call went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Execute,
    Prepare { name: String },
    ExecutePrepared { name: String },
}

/// A recorded call for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub kind: QueryKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// An in-memory database driver for testing.
///
/// Allows configuring expected responses and verifying executed queries.
/// Prepared statements are tracked by name, so executing a name that was
/// never prepared (or was deallocated) fails the way a server would.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use vtrs::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use vtrs::types::WireTypeTag;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .column("id", WireTypeTag::INTEGER)
///             .column("name", WireTypeTag::VARCHAR)
///             .row(&["1", "Alice"])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestDriver {
    responses: Mutex<VecDeque<Result<RawQueryResult>>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    prepared: Mutex<HashMap<String, String>>,
    default_response: RawQueryResult,
    alive: AtomicBool,
    deallocation_error: Mutex<Option<VtRsError>>,
    resets: AtomicUsize,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            recorded_queries: Mutex::new(Vec::new()),
            prepared: Mutex::new(HashMap::new()),
            default_response: RawQueryResult::empty(),
            alive: AtomicBool::new(true),
            deallocation_error: Mutex::new(None),
            resets: AtomicUsize::new(0),
        }
    }

    /// Add a response to be returned by the next query.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: RawQueryResult) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Add multiple responses to be returned by subsequent queries.
    pub fn with_responses(self, responses: impl IntoIterator<Item = RawQueryResult>) -> Self {
        let mut queue = self.responses.lock().unwrap();
        for response in responses {
            queue.push_back(Ok(response));
        }
        drop(queue);
        self
    }

    /// Queue a failure in place of the next response.
    pub fn with_error(self, error: VtRsError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(mut self, response: RawQueryResult) -> Self {
        self.default_response = response;
        self
    }

    /// Toggle what `is_alive` reports.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Make every subsequent DEALLOCATE fail with `error`.
    pub fn fail_deallocations(&self, error: VtRsError) {
        *self.deallocation_error.lock().unwrap() = Some(error);
    }

    /// Names currently prepared on the fake server.
    pub fn prepared_statements(&self) -> Vec<String> {
        let mut names: Vec<String> = self.prepared.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of times the connection was reset.
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Get all recorded queries that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.recorded_queries.lock().unwrap().clone()
    }

    /// Get the SQL of every recorded call, in order.
    pub fn recorded_sql(&self) -> Vec<String> {
        self.recorded_queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.sql.clone())
            .collect()
    }

    /// Get the last recorded query, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.recorded_queries.lock().unwrap().last().cloned()
    }

    /// Clear all recorded queries.
    pub fn clear_recorded_queries(&self) {
        self.recorded_queries.lock().unwrap().clear();
    }

    /// Assert that the last query matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n queries were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.recorded_queries.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }

    fn record(&self, kind: QueryKind, sql: &str, params: &[SqlValue]) {
        self.recorded_queries.lock().unwrap().push(RecordedQuery {
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }

    fn next_response(&self) -> Result<RawQueryResult> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_response.clone()))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VtRsError::query("connection is closed"))
        }
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryTestDriver {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.record(QueryKind::Execute, sql, params);
        self.ensure_alive()?;

        // Statement bookkeeping issued by the adapter itself does not
        // consume scripted responses.
        if let Some(name) = sql.strip_prefix("DEALLOCATE ") {
            if let Some(err) = self.deallocation_error.lock().unwrap().clone() {
                return Err(err);
            }
            self.prepared.lock().unwrap().remove(name.trim());
            return Ok(RawQueryResult::empty());
        }

        self.next_response()
    }

    async fn prepare(&self, name: &str, sql: &str) -> Result<()> {
        self.record(
            QueryKind::Prepare {
                name: name.to_string(),
            },
            sql,
            &[],
        );
        self.ensure_alive()?;

        let mut prepared = self.prepared.lock().unwrap();
        if prepared.contains_key(name) {
            return Err(VtRsError::server(
                "42P05",
                format!("prepared statement \"{name}\" already exists"),
            ));
        }
        prepared.insert(name.to_string(), sql.to_string());
        Ok(())
    }

    async fn execute_prepared(&self, name: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let sql = self.prepared.lock().unwrap().get(name).cloned();
        self.record(
            QueryKind::ExecutePrepared {
                name: name.to_string(),
            },
            sql.as_deref().unwrap_or_default(),
            params,
        );
        self.ensure_alive()?;

        if sql.is_none() {
            return Err(VtRsError::server(
                INVALID_SQL_STATEMENT_NAME,
                format!("prepared statement \"{name}\" does not exist"),
            ));
        }
        self.next_response()
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.prepared.lock().unwrap().clear();
        self.set_alive(true);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.prepared.lock().unwrap().clear();
        self.set_alive(false);
        Ok(())
    }
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    columns: Vec<String>,
    types: Vec<WireTypeTag>,
    rows: Vec<Vec<Value>>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            types: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set varchar columns for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self.types = vec![WireTypeTag::VARCHAR; cols.len()];
        self
    }

    /// Append a column with an explicit wire type.
    pub fn column(mut self, name: &str, tag: WireTypeTag) -> Self {
        self.columns.push(name.to_string());
        self.types.push(tag);
        self
    }

    /// Add a row of text cells.
    pub fn row(mut self, values: &[&str]) -> Self {
        self.rows
            .push(values.iter().map(|s| Value::Text(s.to_string())).collect());
        self
    }

    /// Add a row where `None` is a NULL cell.
    pub fn nullable_row(mut self, values: &[Option<&str>]) -> Self {
        self.rows.push(values.iter().map(|v| (*v).into()).collect());
        self
    }

    /// Build the RawQueryResult.
    pub fn build(self) -> RawQueryResult {
        RawQueryResult::new(self.columns, self.types, self.rows)
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
