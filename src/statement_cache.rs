//! Per-connection cache of server-side prepared statements.
//!
//! Entries are evicted oldest-inserted first. Every entry that leaves the
//! cache is deallocated on the server before the call that removed it
//! returns, unless the connection is no longer alive.

use std::collections::HashMap;
use std::fmt;

use hashlink::LinkedHashMap;

use crate::error::{Result, VtRsError};
use crate::traits::DatabaseDriver;

/// Identifies an independent execution context sharing one cache object,
/// such as a forked worker process. Each scope keeps its own entries and
/// its own statement name counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u64);

impl ScopeId {
    pub fn current_process() -> Self {
        ScopeId(u64::from(std::process::id()))
    }
}

/// `(search path, sql)`; the same text under a different search path can
/// resolve to different tables and is cached separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    search_path: String,
    sql: String,
}

impl CacheKey {
    pub fn new(search_path: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            search_path: search_path.into(),
            sql: sql.into(),
        }
    }

    pub fn search_path(&self) -> &str {
        &self.search_path
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.search_path, self.sql)
    }
}

/// Server-visible name of a prepared statement, tied to the connection
/// epoch it was prepared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementHandle {
    name: String,
    epoch: u64,
}

impl StatementHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug, Default)]
struct Partition {
    counter: u64,
    entries: LinkedHashMap<CacheKey, StatementHandle>,
}

/// Bounded, insertion-ordered map from [`CacheKey`] to [`StatementHandle`].
#[derive(Debug)]
pub struct StatementCache {
    max_size: usize,
    scope: ScopeId,
    epoch: u64,
    partitions: HashMap<ScopeId, Partition>,
}

impl StatementCache {
    /// Create a cache scoped to the current process.
    pub fn new(max_size: usize) -> Self {
        Self::with_scope(max_size, ScopeId::current_process())
    }

    pub fn with_scope(max_size: usize, scope: ScopeId) -> Self {
        Self {
            max_size,
            scope,
            epoch: 0,
            partitions: HashMap::new(),
        }
    }

    /// Switch to another execution context. Entries of other scopes are
    /// neither visible nor deallocated from this one.
    pub fn set_scope(&mut self, scope: ScopeId) {
        self.scope = scope;
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// A zero-sized cache never holds statements.
    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of statements cached for the active scope.
    pub fn len(&self) -> usize {
        self.partition().map_or(0, |p| p.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a handle prepared in the current epoch. No side effects.
    pub fn get(&self, key: &CacheKey) -> Option<&StatementHandle> {
        self.partition()?
            .entries
            .get(key)
            .filter(|handle| handle.epoch == self.epoch)
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Issues the next statement name (`a1`, `a2`, ...) for the active scope.
    /// Names are never reissued within a scope.
    pub fn next_handle(&mut self) -> StatementHandle {
        let epoch = self.epoch;
        let partition = self.partitions.entry(self.scope).or_default();
        partition.counter += 1;
        StatementHandle {
            name: format!("a{}", partition.counter),
            epoch,
        }
    }

    /// Inserts `handle` under `key`, first deallocating any handle the key
    /// replaces and evicting the oldest entries until there is room.
    pub async fn put(
        &mut self,
        key: CacheKey,
        handle: StatementHandle,
        conn: &dyn DatabaseDriver,
    ) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if handle.epoch != self.epoch {
            tracing::warn!(statement = handle.name(), "dropping handle from a previous connection");
            return Ok(());
        }

        let max_size = self.max_size;
        let partition = self.partitions.entry(self.scope).or_default();

        if let Some(replaced) = partition.entries.remove(&key) {
            deallocate(conn, &replaced).await?;
        }
        self.reserve(conn).await?;

        let partition = self.partitions.entry(self.scope).or_default();
        partition.entries.insert(key, handle);

        let len = partition.entries.len();
        if len > max_size {
            return Err(VtRsError::CapacityInvariant { len, max: max_size });
        }
        Ok(())
    }

    /// Evicts the oldest entries of the active scope until one more fits.
    ///
    /// Callers run this before preparing a new statement, so an eviction
    /// failure leaves nothing prepared that the cache does not track.
    pub async fn reserve(&mut self, conn: &dyn DatabaseDriver) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let max_size = self.max_size;
        let partition = self.partitions.entry(self.scope).or_default();
        while partition.entries.len() >= max_size {
            let Some((evicted_key, evicted)) = partition.entries.pop_front() else {
                break;
            };
            tracing::debug!(statement = evicted.name(), sql = evicted_key.sql(), "evicting prepared statement");
            deallocate(conn, &evicted).await?;
        }
        Ok(())
    }

    /// Removes and deallocates a single entry. Returns whether it existed.
    pub async fn invalidate(&mut self, key: &CacheKey, conn: &dyn DatabaseDriver) -> Result<bool> {
        let removed = self
            .partitions
            .get_mut(&self.scope)
            .and_then(|p| p.entries.remove(key));
        match removed {
            Some(handle) => {
                deallocate(conn, &handle).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deallocates and removes every entry of the active scope.
    ///
    /// The cache is empty afterwards even when a deallocation fails; the
    /// first failure is returned once all entries are gone.
    pub async fn clear(&mut self, conn: &dyn DatabaseDriver) -> Result<()> {
        let Some(partition) = self.partitions.get_mut(&self.scope) else {
            return Ok(());
        };
        let entries = std::mem::take(&mut partition.entries);

        let mut first_error = None;
        for (_, handle) in entries {
            if let Err(err) = deallocate(conn, &handle).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Marks every outstanding handle as belonging to a dead connection.
    /// Called after the transport reconnects.
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
        for partition in self.partitions.values_mut() {
            partition.entries.clear();
        }
    }

    fn partition(&self) -> Option<&Partition> {
        self.partitions.get(&self.scope)
    }
}

/// A dead connection cannot accept DEALLOCATE; the statement died with it.
async fn deallocate(conn: &dyn DatabaseDriver, handle: &StatementHandle) -> Result<()> {
    if !conn.is_alive().await {
        tracing::warn!(
            statement = handle.name(),
            "connection not active, skipping deallocation"
        );
        return Ok(());
    }
    conn.deallocate(handle.name()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{InMemoryTestDriver, QueryKind};

    fn key(sql: &str) -> CacheKey {
        CacheKey::new("public", sql)
    }

    async fn insert(cache: &mut StatementCache, sql: &str, driver: &InMemoryTestDriver) {
        let handle = cache.next_handle();
        cache.put(key(sql), handle, driver).await.unwrap();
    }

    fn deallocations(driver: &InMemoryTestDriver) -> Vec<String> {
        driver
            .recorded_queries()
            .into_iter()
            .filter(|q| q.kind == QueryKind::Execute && q.sql.starts_with("DEALLOCATE"))
            .map(|q| q.sql)
            .collect()
    }

    #[tokio::test]
    async fn test_len_never_exceeds_bound() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(3, ScopeId(1));

        for i in 0..10 {
            insert(&mut cache, &format!("SELECT {i}"), &driver).await;
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_fifo_eviction() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(2, ScopeId(1));

        insert(&mut cache, "SELECT 1", &driver).await;
        insert(&mut cache, "SELECT 2", &driver).await;
        // A lookup does not refresh the entry's position.
        assert_eq!(cache.get(&key("SELECT 1")).unwrap().name(), "a1");
        insert(&mut cache, "SELECT 3", &driver).await;

        assert!(cache.get(&key("SELECT 1")).is_none());
        assert_eq!(cache.get(&key("SELECT 2")).unwrap().name(), "a2");
        assert_eq!(cache.get(&key("SELECT 3")).unwrap().name(), "a3");
        assert_eq!(deallocations(&driver), vec!["DEALLOCATE a1".to_string()]);
    }

    #[tokio::test]
    async fn test_dead_connection_eviction_skips_deallocate() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(1, ScopeId(1));

        insert(&mut cache, "SELECT 1", &driver).await;
        driver.set_alive(false);
        insert(&mut cache, "SELECT 2", &driver).await;

        assert!(cache.get(&key("SELECT 1")).is_none());
        assert_eq!(cache.len(), 1);
        assert!(deallocations(&driver).is_empty());
    }

    #[tokio::test]
    async fn test_deallocate_failure_on_live_connection_surfaces() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(1, ScopeId(1));

        insert(&mut cache, "SELECT 1", &driver).await;
        driver.fail_deallocations(VtRsError::query("broken pipe"));
        let handle = cache.next_handle();
        let err = cache.put(key("SELECT 2"), handle, &driver).await.unwrap_err();

        assert!(matches!(err, VtRsError::QueryFailed { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(10, ScopeId(1));

        insert(&mut cache, "SELECT 1", &driver).await;
        insert(&mut cache, "SELECT 2", &driver).await;
        insert(&mut cache, "SELECT 3", &driver).await;

        assert!(cache.invalidate(&key("SELECT 2"), &driver).await.unwrap());
        assert!(!cache.invalidate(&key("SELECT 2"), &driver).await.unwrap());
        assert_eq!(deallocations(&driver), vec!["DEALLOCATE a2".to_string()]);

        cache.clear(&driver).await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(
            deallocations(&driver),
            vec![
                "DEALLOCATE a2".to_string(),
                "DEALLOCATE a1".to_string(),
                "DEALLOCATE a3".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_empties_cache_even_on_failure() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(10, ScopeId(1));
        insert(&mut cache, "SELECT 1", &driver).await;
        insert(&mut cache, "SELECT 2", &driver).await;

        driver.fail_deallocations(VtRsError::query("broken pipe"));
        assert!(cache.clear(&driver).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_search_path_distinguishes_keys() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(10, ScopeId(1));

        let h1 = cache.next_handle();
        cache.put(CacheKey::new("a", "SELECT * FROM t"), h1, &driver).await.unwrap();
        let h2 = cache.next_handle();
        cache.put(CacheKey::new("b", "SELECT * FROM t"), h2, &driver).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&CacheKey::new("a", "SELECT * FROM t")).unwrap().name(), "a1");
        assert_eq!(cache.get(&CacheKey::new("b", "SELECT * FROM t")).unwrap().name(), "a2");
    }

    #[tokio::test]
    async fn test_scopes_are_partitioned() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(10, ScopeId(1));
        insert(&mut cache, "SELECT 1", &driver).await;

        cache.set_scope(ScopeId(2));
        assert!(cache.get(&key("SELECT 1")).is_none());
        assert_eq!(cache.next_handle().name(), "a1");

        // Clearing the child scope leaves the parent's statements alone.
        cache.clear(&driver).await.unwrap();
        assert!(deallocations(&driver).is_empty());

        cache.set_scope(ScopeId(1));
        assert_eq!(cache.get(&key("SELECT 1")).unwrap().name(), "a1");
        assert_eq!(cache.next_handle().name(), "a2");
    }

    #[tokio::test]
    async fn test_advance_epoch_invalidates_handles() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(10, ScopeId(1));
        insert(&mut cache, "SELECT 1", &driver).await;
        let stale = cache.get(&key("SELECT 1")).cloned().unwrap();

        cache.advance_epoch();
        assert!(cache.is_empty());
        assert_eq!(cache.epoch(), stale.epoch() + 1);

        // A handle issued before the reconnect is never stored again.
        cache.put(key("SELECT 1"), stale, &driver).await.unwrap();
        assert!(cache.get(&key("SELECT 1")).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.next_handle().name(), "a2");
    }

    #[tokio::test]
    async fn test_disabled_cache_holds_nothing() {
        let driver = InMemoryTestDriver::new();
        let mut cache = StatementCache::with_scope(0, ScopeId(1));
        assert!(!cache.is_enabled());
        insert(&mut cache, "SELECT 1", &driver).await;
        assert!(cache.is_empty());
    }
}
