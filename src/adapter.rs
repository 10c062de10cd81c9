use std::sync::Arc;

use crate::coercion::coerce_rows;
use crate::config::AdapterConfig;
use crate::drivers::TokioPostgresDriver;
use crate::error::{Result, VtRsError};
use crate::explain;
use crate::identifier::split_schema_and_table;
use crate::quoting::{self, quote_string, type_cast};
use crate::schema::statements;
use crate::schema::{build_column, type_to_sql, ColumnDescriptor, ColumnOptions, ColumnType};
use crate::statement_cache::{CacheKey, ScopeId, StatementCache, StatementHandle};
use crate::traits::{DatabaseDriver, SqlStatement};
use crate::types::{QueryResult, RawQueryResult, SqlValue, Value};

/// Main entry point for vtrs.
///
/// Owns one connection and its prepared statement cache. Every operation
/// takes `&mut self` and completes before returning, so one adapter serves
/// one caller at a time.
///
/// # Example
/// ```ignore
/// use vtrs::{AdapterConfig, SqlValue, VerticaAdapter};
///
/// let mut adapter = VerticaAdapter::connect(AdapterConfig::new("analytics")).await?;
///
/// let rows = adapter
///     .exec("SELECT id, name FROM users WHERE id = $1", &[SqlValue::Int64(7)])
///     .await?;
/// let name = rows.single_row()?.get("name")?.clone();
/// ```
pub struct VerticaAdapter {
    driver: Arc<dyn DatabaseDriver>,
    config: AdapterConfig,
    statements: StatementCache,
    schema_search_path: Option<String>,
    in_transaction: bool,
}

impl VerticaAdapter {
    /// Connect using the tokio-postgres transport and configure the session.
    pub async fn connect(config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        let driver = TokioPostgresDriver::connect(&config.to_connection_string()).await?;
        let mut adapter = Self::with_driver(Arc::new(driver), config);
        adapter.configure_connection().await?;
        Ok(adapter)
    }

    /// Create an adapter over an already established transport.
    /// Useful for testing or using alternative database drivers.
    ///
    /// No statements are issued; call [`configure_connection`](Self::configure_connection)
    /// if the session still needs its search path and time zone applied.
    pub fn with_driver(driver: Arc<dyn DatabaseDriver>, config: AdapterConfig) -> Self {
        let statements = StatementCache::new(config.statement_limit);
        let schema_search_path = config.schema_search_path.clone();
        Self {
            driver,
            config,
            statements,
            schema_search_path,
            in_transaction: false,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn statement_cache(&self) -> &StatementCache {
        &self.statements
    }

    /// Give this adapter its own statement namespace, e.g. after it was
    /// handed to a forked worker.
    pub fn set_cache_scope(&mut self, scope: ScopeId) {
        self.statements.set_scope(scope);
    }

    // CONNECTION MANAGEMENT ===================================

    /// Apply search path, string literal mode, time zone and autocommit.
    pub async fn configure_connection(&mut self) -> Result<()> {
        if let Some(path) = self.config.schema_search_path.clone() {
            self.set_schema_search_path(&path).await?;
        }

        if let Err(err) = self.execute("SET standard_conforming_strings = on").await {
            tracing::debug!(error = %err, "standard_conforming_strings not supported");
        }

        if let Some(time_zone) = self.config.time_zone.clone() {
            self.execute(&format!("SET TIME ZONE TO {}", quote_string(&time_zone)))
                .await?;
        }

        self.execute("SET SESSION AUTOCOMMIT TO ON").await?;
        Ok(())
    }

    /// Is this connection alive and ready for queries?
    pub async fn is_active(&mut self) -> bool {
        if !self.driver.is_alive().await {
            return false;
        }
        self.driver.execute("SELECT 1", &[]).await.is_ok()
    }

    /// Close then reopen the connection. Every handle issued before the
    /// reconnect becomes unusable.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.clear_cache_quietly().await;
        self.driver.reset().await?;
        self.statements.advance_epoch();
        self.schema_search_path = None;
        self.in_transaction = false;
        tracing::debug!(epoch = self.statements.epoch(), "reconnected");
        self.configure_connection().await
    }

    /// Drop cached statements and session memos without reconnecting.
    pub async fn reset(&mut self) -> Result<()> {
        self.clear_statement_cache().await?;
        self.schema_search_path = self.config.schema_search_path.clone();
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.clear_cache_quietly().await;
        if let Err(err) = self.driver.close().await {
            tracing::warn!(error = %err, "error while closing connection");
        }
        self.in_transaction = false;
    }

    // STATEMENT CACHE =========================================

    /// Deallocate and forget every cached statement.
    pub async fn clear_statement_cache(&mut self) -> Result<()> {
        self.statements.clear(&*self.driver).await
    }

    /// Drop the cached statement for `sql` under the current search path.
    /// Returns whether one was cached.
    pub async fn invalidate_statement(&mut self, sql: &str) -> Result<bool> {
        let key = self.sql_key(sql).await?;
        self.statements.invalidate(&key, &*self.driver).await
    }

    async fn clear_cache_quietly(&mut self) {
        if let Err(err) = self.clear_statement_cache().await {
            tracing::warn!(error = %err, "failed to deallocate cached statements");
        }
    }

    // DATABASE STATEMENTS =====================================

    /// Run `sql`, preparing and caching it when it has bind values, and
    /// return coerced rows.
    pub async fn exec(&mut self, sql: &str, binds: &[SqlValue]) -> Result<QueryResult> {
        let mut raw = if self.uses_statement_cache(binds) {
            self.exec_cache(sql, binds).await?
        } else {
            self.exec_no_cache(sql, binds).await?
        };
        coerce_rows(&mut raw.rows, &raw.types)?;
        Ok(QueryResult::from_raw(raw))
    }

    /// Like [`exec`](Self::exec), casting each bind to the representation
    /// its target column expects.
    pub async fn exec_with_columns(
        &mut self,
        sql: &str,
        binds: Vec<(Option<&ColumnDescriptor>, SqlValue)>,
    ) -> Result<QueryResult> {
        let binds: Vec<SqlValue> = binds
            .into_iter()
            .map(|(column, value)| type_cast(value, column))
            .collect();
        self.exec(sql, &binds).await
    }

    /// Execute SQL produced by an external generator.
    pub async fn exec_statement<S: SqlStatement + ?Sized>(
        &mut self,
        statement: &S,
    ) -> Result<QueryResult> {
        let binds = statement.binds();
        self.exec(&statement.to_sql(), &binds).await
    }

    /// Run `sql` unprepared and return its rows.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>> {
        Ok(self
            .exec(sql, &[])
            .await?
            .rows()
            .into_iter()
            .map(|row| row.into_values())
            .collect())
    }

    pub async fn select_rows(&mut self, sql: &str, binds: &[SqlValue]) -> Result<Vec<Vec<Value>>> {
        Ok(self
            .exec(sql, binds)
            .await?
            .rows()
            .into_iter()
            .map(|row| row.into_values())
            .collect())
    }

    /// First column of the first row, if any.
    pub async fn select_value(&mut self, sql: &str, binds: &[SqlValue]) -> Result<Option<Value>> {
        Ok(self
            .select_rows(sql, binds)
            .await?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    pub async fn explain<S: SqlStatement + ?Sized>(&mut self, statement: &S) -> Result<String> {
        let sql = format!("EXPLAIN {}", statement.to_sql());
        let result = self.exec(&sql, &statement.binds()).await?;
        Ok(explain::pretty_print(&result))
    }

    /// Execute a statement without coercion, discarding its rows.
    async fn execute(&mut self, sql: &str) -> Result<RawQueryResult> {
        tracing::debug!(sql, "execute");
        self.driver.execute(sql, &[]).await
    }

    fn uses_statement_cache(&self, binds: &[SqlValue]) -> bool {
        !binds.is_empty() && self.config.prepared_statements && self.statements.is_enabled()
    }

    async fn exec_no_cache(&mut self, sql: &str, binds: &[SqlValue]) -> Result<RawQueryResult> {
        tracing::debug!(sql, binds = binds.len(), "exec");
        self.driver.execute(sql, binds).await
    }

    /// Executes through a cached prepared statement. A stale plan is
    /// invalidated and re-prepared once; a second stale failure surfaces.
    async fn exec_cache(&mut self, sql: &str, binds: &[SqlValue]) -> Result<RawQueryResult> {
        let key = self.sql_key(sql).await?;
        let mut retried = false;

        loop {
            let handle = self.prepare_statement(&key).await?;
            tracing::debug!(statement = handle.name(), sql, "exec prepared");

            match self.driver.execute_prepared(handle.name(), binds).await {
                Ok(raw) => return Ok(raw),
                Err(err) if err.is_stale_plan() => {
                    self.statements.invalidate(&key, &*self.driver).await?;
                    if retried {
                        return Err(VtRsError::StalePlan {
                            statement: handle.name().to_string(),
                            message: err.to_string(),
                        });
                    }
                    tracing::warn!(statement = handle.name(), error = %err, "stale prepared statement, re-preparing");
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Prepare the statement if it hasn't been prepared, return its handle.
    async fn prepare_statement(&mut self, key: &CacheKey) -> Result<StatementHandle> {
        if let Some(handle) = self.statements.get(key) {
            return Ok(handle.clone());
        }

        // Evict before preparing so a failed deallocation leaves no orphan.
        self.statements.reserve(&*self.driver).await?;

        let handle = self.statements.next_handle();
        tracing::debug!(statement = handle.name(), sql = key.sql(), "prepare");
        self.driver.prepare(handle.name(), key.sql()).await?;
        if let Err(err) = self
            .statements
            .put(key.clone(), handle.clone(), &*self.driver)
            .await
        {
            if let Err(cleanup) = self.driver.deallocate(handle.name()).await {
                tracing::warn!(statement = handle.name(), error = %cleanup, "failed to deallocate untracked statement");
            }
            return Err(err);
        }
        Ok(handle)
    }

    async fn sql_key(&mut self, sql: &str) -> Result<CacheKey> {
        Ok(CacheKey::new(self.schema_search_path().await?, sql))
    }

    // QUOTING =================================================

    pub fn quote(&self, value: &SqlValue, column: Option<&ColumnDescriptor>) -> Result<String> {
        quoting::quote(value, column)
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        quoting::quote_identifier(name)
    }

    pub fn quote_table_name(&self, name: &str) -> String {
        quoting::quote_table_name(name)
    }

    // TRANSACTIONS ============================================

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub async fn begin_db_transaction(&mut self) -> Result<()> {
        self.execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit_db_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            self.execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    pub async fn rollback_db_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            self.execute("ROLLBACK").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    pub async fn create_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command("SAVEPOINT", name).await
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command("ROLLBACK TO SAVEPOINT", name).await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command("RELEASE SAVEPOINT", name).await
    }

    async fn savepoint_command(&mut self, command: &str, name: &str) -> Result<()> {
        if self.in_transaction {
            let sql = format!("{command} {}", quoting::quote_identifier(name));
            self.execute(&sql).await?;
        }
        Ok(())
    }

    // SCHEMA ==================================================

    /// The active search path, read from the server on first use.
    pub async fn schema_search_path(&mut self) -> Result<String> {
        if let Some(path) = &self.schema_search_path {
            return Ok(path.clone());
        }
        // Read straight off the transport: `exec` keys its cache on this value.
        let mut raw = self.execute("SHOW search_path").await?;
        coerce_rows(&mut raw.rows, &raw.types)?;
        // SHOW answers either `setting` or `(name, setting)`.
        let path = raw
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().last())
            .filter(|value| !value.is_null())
            .map(|value| value.to_string())
            .ok_or(VtRsError::UnexpectedRowCount {
                expected: 1,
                actual: 0,
            })?;
        self.schema_search_path = Some(path.clone());
        Ok(path)
    }

    /// Sets the schema search path to a string of comma-separated schema names.
    pub async fn set_schema_search_path(&mut self, schema_csv: &str) -> Result<()> {
        self.execute(&format!("SET search_path TO {schema_csv}")).await?;
        self.schema_search_path = Some(schema_csv.to_string());
        Ok(())
    }

    pub async fn current_schema(&mut self) -> Result<String> {
        self.first_text("SELECT current_schema()").await
    }

    pub async fn current_database(&mut self) -> Result<String> {
        self.first_text("SELECT current_database()").await
    }

    /// Tables in the current schema.
    pub async fn tables(&mut self) -> Result<Vec<String>> {
        let schema = self.current_schema().await?;
        self.names(&format!(
            "SELECT table_name FROM v_catalog.tables WHERE table_schema = {}",
            quote_string(&schema)
        ))
        .await
    }

    /// Views in the current schema.
    pub async fn views(&mut self) -> Result<Vec<String>> {
        let schema = self.current_schema().await?;
        self.names(&format!(
            "SELECT table_name FROM v_catalog.views WHERE table_schema = {}",
            quote_string(&schema)
        ))
        .await
    }

    /// Whether `name` (optionally schema-qualified) is a table. Unqualified
    /// names are looked up in the current schema only.
    pub async fn table_exists(&mut self, name: &str) -> Result<bool> {
        let (schema, table) = self.schema_and_name(name).await?;
        self.count(&format!(
            "SELECT COUNT(*) FROM v_catalog.tables WHERE table_name = {} AND table_schema = {}",
            quote_string(&table),
            quote_string(&schema)
        ))
        .await
        .map(|n| n > 0)
    }

    pub async fn view_exists(&mut self, name: &str) -> Result<bool> {
        let (schema, view) = self.schema_and_name(name).await?;
        self.count(&format!(
            "SELECT COUNT(*) FROM v_catalog.views WHERE table_name = {} AND table_schema = {}",
            quote_string(&view),
            quote_string(&schema)
        ))
        .await
        .map(|n| n > 0)
    }

    pub async fn schema_exists(&mut self, name: &str) -> Result<bool> {
        self.count(&format!(
            "SELECT COUNT(*) FROM v_catalog.schemata WHERE schema_name = {}",
            quote_string(name)
        ))
        .await
        .map(|n| n > 0)
    }

    /// Column descriptors for a table, in catalog order.
    pub async fn columns(&mut self, table_name: &str) -> Result<Vec<ColumnDescriptor>> {
        let (schema, table) = self.schema_and_name(table_name).await?;
        let sql = format!(
            "SELECT column_name, data_type, column_default, is_nullable \
             FROM v_catalog.columns WHERE table_name = {} AND table_schema = {} \
             ORDER BY ordinal_position",
            quote_string(&table),
            quote_string(&schema)
        );

        self.query(&sql)
            .await?
            .into_iter()
            .map(|row| -> Result<ColumnDescriptor> {
                let text = |i: usize| row.get(i).and_then(Value::as_str);
                let name = text(0).ok_or_else(|| VtRsError::ColumnNotFound("column_name".into()))?;
                let sql_type = text(1).ok_or_else(|| VtRsError::ColumnNotFound("data_type".into()))?;
                let nullable = matches!(text(3), Some("t" | "true"));
                Ok(build_column(name, sql_type, text(2), nullable))
            })
            .collect()
    }

    async fn schema_and_name(&mut self, name: &str) -> Result<(String, String)> {
        let (schema, table) = split_schema_and_table(name);
        let schema = match schema {
            Some(schema) => schema,
            None => self.current_schema().await?,
        };
        Ok((schema, table))
    }

    async fn first_text(&mut self, sql: &str) -> Result<String> {
        match self.query(sql).await?.into_iter().next().and_then(|r| r.into_iter().next()) {
            Some(value) if !value.is_null() => Ok(value.to_string()),
            _ => Err(VtRsError::UnexpectedRowCount {
                expected: 1,
                actual: 0,
            }),
        }
    }

    async fn names(&mut self, sql: &str) -> Result<Vec<String>> {
        Ok(self
            .query(sql)
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|value| value.to_string())
            .collect())
    }

    async fn count(&mut self, sql: &str) -> Result<i64> {
        match self.select_value(sql, &[]).await? {
            Some(Value::Integer(n)) => Ok(n),
            Some(Value::Text(s)) => s
                .trim()
                .parse()
                .map_err(|_| VtRsError::malformed("integer", s)),
            _ => Err(VtRsError::UnexpectedRowCount {
                expected: 1,
                actual: 0,
            }),
        }
    }

    // SCHEMA STATEMENTS =======================================
    //
    // Every statement below may change what a cached plan refers to, so the
    // statement cache is cleared before it runs.

    pub fn type_to_sql(
        &self,
        ty: &ColumnType,
        limit: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> Result<String> {
        type_to_sql(ty, limit, precision, scale)
    }

    pub async fn create_database(&mut self, name: &str) -> Result<()> {
        self.schema_statement(&statements::create_database(name)).await
    }

    pub async fn drop_database(&mut self, name: &str) -> Result<()> {
        self.schema_statement(&statements::drop_database(name)).await
    }

    pub async fn recreate_database(&mut self, name: &str) -> Result<()> {
        self.drop_database(name).await?;
        self.create_database(name).await
    }

    pub async fn drop_table(&mut self, table: &str) -> Result<()> {
        self.schema_statement(&statements::drop_table(table)).await
    }

    pub async fn rename_table(&mut self, table: &str, new_name: &str) -> Result<()> {
        self.schema_statement(&statements::rename_table(table, new_name))
            .await
    }

    pub async fn add_column(
        &mut self,
        table: &str,
        column: &str,
        ty: &ColumnType,
        options: &ColumnOptions,
    ) -> Result<()> {
        self.clear_statement_cache().await?;
        let sql = statements::add_column(table, column, ty, options)?;
        self.execute(&sql).await?;
        Ok(())
    }

    /// Changes the type, then the default and nullability when `options`
    /// carries them.
    pub async fn change_column(
        &mut self,
        table: &str,
        column: &str,
        ty: &ColumnType,
        options: &ColumnOptions,
    ) -> Result<()> {
        self.clear_statement_cache().await?;
        let sql = statements::change_column(table, column, ty, options)?;
        self.execute(&sql).await?;

        if let Some(default) = &options.default {
            self.change_column_default(table, column, default).await?;
        }
        if let Some(null) = options.null {
            self.change_column_null(table, column, null, options.default.as_ref())
                .await?;
        }
        Ok(())
    }

    pub async fn change_column_default(
        &mut self,
        table: &str,
        column: &str,
        default: &SqlValue,
    ) -> Result<()> {
        self.clear_statement_cache().await?;
        let sql = statements::change_column_default(table, column, default)?;
        self.execute(&sql).await?;
        Ok(())
    }

    /// Allow or forbid NULLs. When forbidding with a `default`, existing
    /// NULLs are backfilled first.
    pub async fn change_column_null(
        &mut self,
        table: &str,
        column: &str,
        null: bool,
        default: Option<&SqlValue>,
    ) -> Result<()> {
        self.clear_statement_cache().await?;
        for sql in statements::change_column_null(table, column, null, default)? {
            self.execute(&sql).await?;
        }
        Ok(())
    }

    pub async fn rename_column(&mut self, table: &str, column: &str, new_name: &str) -> Result<()> {
        self.schema_statement(&statements::rename_column(table, column, new_name))
            .await
    }

    pub async fn remove_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.schema_statement(&statements::remove_column(table, column))
            .await
    }

    pub async fn set_session_auth(&mut self, user: &str) -> Result<()> {
        self.schema_statement(&statements::session_authorization(user))
            .await
    }

    async fn schema_statement(&mut self, sql: &str) -> Result<()> {
        self.clear_statement_cache().await?;
        self.execute(sql).await?;
        Ok(())
    }
}
