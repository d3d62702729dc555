// ============================================================================
// In-memory data source
// ============================================================================
//
// A reference Connection/DataSource pair with no I/O. Statements are opaque
// strings: while auto-commit is off they stay pending on the connection until
// commit moves them into the shared committed log. Every call is counted and
// every operation can be made to fail, so transaction behavior is observable
// from tests.
//
// ============================================================================

use super::{Connection, DataSource};
use crate::core::{IsolationLevel, Result, TxError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Operations of the in-memory source that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Acquire,
    Configure,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct Counters {
    acquisitions: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    auto_commit_changes: AtomicUsize,
    isolation_changes: AtomicUsize,
}

#[derive(Debug, Default)]
struct Failures {
    acquire: AtomicBool,
    configure: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
    close: AtomicBool,
}

impl Failures {
    fn flag(&self, op: Operation) -> &AtomicBool {
        match op {
            Operation::Acquire => &self.acquire,
            Operation::Configure => &self.configure,
            Operation::Commit => &self.commit,
            Operation::Rollback => &self.rollback,
            Operation::Close => &self.close,
        }
    }

    fn check(&self, op: Operation) -> Result<()> {
        if self.flag(op).load(Ordering::SeqCst) {
            return Err(TxError::ConnectionError(format!(
                "injected {:?} failure",
                op
            )));
        }
        Ok(())
    }
}

/// State shared between a source and every connection it hands out
#[derive(Debug, Default)]
struct Shared {
    counters: Counters,
    failures: Failures,
    committed: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

/// Snapshot of call counts across all connections of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    pub acquisitions: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    pub auto_commit_changes: usize,
    pub isolation_changes: usize,
}

impl std::fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Connection Stats: {} acquired, {} commits, {} rollbacks, {} closed",
            self.acquisitions, self.commits, self.rollbacks, self.closes
        )
    }
}

/// In-memory [`DataSource`]
///
/// Cloning yields another handle onto the same counters and committed log.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    shared: Arc<Shared>,
    initial_auto_commit: bool,
}

impl MemoryDataSource {
    /// New source whose connections start in auto-commit mode
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            initial_auto_commit: true,
        }
    }

    /// Set the auto-commit mode fresh connections start in
    pub fn initial_auto_commit(mut self, auto_commit: bool) -> Self {
        self.initial_auto_commit = auto_commit;
        self
    }

    /// Force an operation to fail (or stop failing) on every connection
    pub fn set_failure(&self, op: Operation, fail: bool) {
        self.shared.failures.flag(op).store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ConnectionStats {
        let c = &self.shared.counters;
        ConnectionStats {
            acquisitions: c.acquisitions.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            closes: c.closes.load(Ordering::SeqCst),
            auto_commit_changes: c.auto_commit_changes.load(Ordering::SeqCst),
            isolation_changes: c.isolation_changes.load(Ordering::SeqCst),
        }
    }

    /// Statements made durable so far, in commit order
    pub fn committed(&self) -> Result<Vec<String>> {
        Ok(self.shared.committed.lock()?.clone())
    }
}

impl Default for MemoryDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    type Connection = MemoryConnection;

    async fn get_connection(&self) -> Result<MemoryConnection> {
        self.shared
            .failures
            .check(Operation::Acquire)
            .map_err(|e| TxError::AcquisitionError(e.to_string()))?;

        self.shared
            .counters
            .acquisitions
            .fetch_add(1, Ordering::SeqCst);
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(MemoryConnection {
            id,
            shared: Arc::clone(&self.shared),
            auto_commit: self.initial_auto_commit,
            isolation_level: None,
            pending: Vec::new(),
            closed: false,
        })
    }
}

/// Connection handed out by [`MemoryDataSource`]
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    shared: Arc<Shared>,
    auto_commit: bool,
    isolation_level: Option<IsolationLevel>,
    pending: Vec<String>,
    closed: bool,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Statements executed but not yet committed
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Record a statement; durable immediately under auto-commit
    pub fn execute(&mut self, statement: &str) -> Result<()> {
        self.ensure_open()?;

        if self.auto_commit {
            self.shared.committed.lock()?.push(statement.to_string());
        } else {
            self.pending.push(statement.to_string());
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TxError::ConnectionError(format!(
                "Connection {} is closed",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn auto_commit(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.auto_commit)
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.ensure_open()?;
        self.shared.failures.check(Operation::Configure)?;

        // Switching auto-commit on commits whatever is pending
        if auto_commit && !self.auto_commit && !self.pending.is_empty() {
            let mut committed = self.shared.committed.lock()?;
            committed.append(&mut self.pending);
        }

        self.auto_commit = auto_commit;
        self.shared
            .counters
            .auto_commit_changes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        self.shared.failures.check(Operation::Configure)?;

        self.isolation_level = Some(level);
        self.shared
            .counters
            .isolation_changes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.shared.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.shared.failures.check(Operation::Commit)?;

        let mut committed = self.shared.committed.lock()?;
        committed.append(&mut self.pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.shared.failures.check(Operation::Rollback)?;

        self.pending.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.shared.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.failures.check(Operation::Close)?;

        self.pending.clear();
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_commit_statements_are_durable() {
        let source = MemoryDataSource::new();
        let mut conn = source.get_connection().await.unwrap();

        conn.execute("INSERT 1").unwrap();
        assert!(conn.pending().is_empty());
        assert_eq!(source.committed().unwrap(), vec!["INSERT 1".to_string()]);
    }

    #[tokio::test]
    async fn test_commit_and_rollback_pending() {
        let source = MemoryDataSource::new().initial_auto_commit(false);
        let mut conn = source.get_connection().await.unwrap();

        conn.execute("INSERT 1").unwrap();
        conn.rollback().await.unwrap();
        conn.execute("INSERT 2").unwrap();
        conn.commit().await.unwrap();

        assert_eq!(source.committed().unwrap(), vec!["INSERT 2".to_string()]);
        let stats = source.stats();
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_enabling_auto_commit_flushes_pending() {
        let source = MemoryDataSource::new().initial_auto_commit(false);
        let mut conn = source.get_connection().await.unwrap();

        conn.execute("UPDATE a").unwrap();
        conn.set_auto_commit(true).await.unwrap();

        assert_eq!(source.committed().unwrap(), vec!["UPDATE a".to_string()]);
        assert!(conn.pending().is_empty());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_work() {
        let source = MemoryDataSource::new();
        let mut conn = source.get_connection().await.unwrap();

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(conn.execute("SELECT 1").is_err());
        assert!(conn.commit().await.is_err());
        assert_eq!(source.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let source = MemoryDataSource::new();

        source.set_failure(Operation::Acquire, true);
        let err = source.get_connection().await.unwrap_err();
        assert!(matches!(err, TxError::AcquisitionError(_)));
        assert_eq!(source.stats().acquisitions, 0);

        source.set_failure(Operation::Acquire, false);
        source.set_failure(Operation::Commit, true);
        let mut conn = source.get_connection().await.unwrap();
        assert!(conn.commit().await.is_err());
        assert_eq!(source.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let source = MemoryDataSource::new();
        let a = source.get_connection().await.unwrap();
        let b = source.get_connection().await.unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(source.stats().acquisitions, 2);
    }
}
