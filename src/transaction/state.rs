// ============================================================================
// Transaction Handle
// ============================================================================
//
// A Transaction owns at most one connection and moves through:
//
//   Unacquired ──get_connection──> Acquired ──close──> Closed
//        │                                               ▲
//        └───────────────────close───────────────────────┘
//
// Nothing leaves Closed. Whether commit/rollback reach the connection is
// decided by the DelegationStrategy fixed at construction.
//
// ============================================================================

use crate::config::DelegationStrategy;
use crate::connection::{Connection, DataSource};
use crate::core::{IsolationLevel, Result, TxError};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No connection yet; the first `get_connection` acquires one
    Unacquired,

    /// Holding a live connection
    Acquired,

    /// Connection released; every operation except `close` fails
    Closed,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Unacquired => write!(f, "UNACQUIRED"),
            TransactionState::Acquired => write!(f, "ACQUIRED"),
            TransactionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Per-handle settings taken from the factory configuration
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandleSettings {
    pub strategy: DelegationStrategy,
    pub timeout: Option<Duration>,
    pub reset_auto_commit_on_close: bool,
}

/// A transaction over a single connection
///
/// Obtain one from [`TransactionFactory`](super::TransactionFactory).
///
/// # Thread Safety
/// All operations take `&mut self`; share a handle across tasks only behind
/// your own lock. Independent handles share no state.
pub struct Transaction<C: Connection> {
    id: TransactionId,
    state: TransactionState,
    source: Option<Arc<dyn DataSource<Connection = C>>>,
    connection: Option<C>,
    /// Applied at acquisition; `None` means driver default
    isolation_level: Option<IsolationLevel>,
    /// Desired auto-commit; `None` for wrapped connections
    auto_commit: Option<bool>,
    /// Connection may hold work not yet committed or rolled back
    in_transaction: bool,
    settings: HandleSettings,
}

impl<C: Connection> Transaction<C> {
    pub(crate) fn from_source(
        source: Arc<dyn DataSource<Connection = C>>,
        isolation_level: Option<IsolationLevel>,
        auto_commit: bool,
        settings: HandleSettings,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Unacquired,
            source: Some(source),
            connection: None,
            isolation_level,
            auto_commit: Some(auto_commit),
            in_transaction: false,
            settings,
        }
    }

    pub(crate) fn from_connection(connection: C, settings: HandleSettings) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Acquired,
            source: None,
            connection: Some(connection),
            isolation_level: None,
            auto_commit: None,
            in_transaction: true,
            settings,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn strategy(&self) -> DelegationStrategy {
        self.settings.strategy
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// Requested auto-commit mode, unknown for wrapped connections
    pub fn desired_auto_commit(&self) -> Option<bool> {
        self.auto_commit
    }

    pub fn is_closed(&self) -> bool {
        self.state == TransactionState::Closed
    }

    /// Get the connection, acquiring it from the data source on first use
    ///
    /// # Errors
    /// `AcquisitionError` if the source fails or the connection cannot be
    /// configured; the handle stays unacquired and the call may be retried.
    /// `TransactionClosed` after `close`.
    pub async fn get_connection(&mut self) -> Result<&mut C> {
        self.ensure_open()?;

        if self.connection.is_none() {
            let connection = self.open_connection().await?;
            self.connection = Some(connection);
            self.state = TransactionState::Acquired;
        }

        self.in_transaction = true;
        let id = self.id;
        self.connection
            .as_mut()
            .ok_or_else(|| TxError::AcquisitionError(format!("{} has no connection", id)))
    }

    /// Commit the connection's pending work
    ///
    /// No-op when container-managed, when nothing was acquired yet, or when
    /// the connection is auto-committing. Auto-commit is read from the live
    /// connection, not from the mode the handle was created with: turning it
    /// off through [`get_connection`](Self::get_connection) makes commit
    /// forward, and wrapped connections behave the same way.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;

        if !self.settings.strategy.is_self_managed() {
            return Ok(());
        }

        let id = self.id;
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        if connection
            .auto_commit()
            .await
            .map_err(|e| TxError::CommitError(e.to_string()))?
        {
            return Ok(());
        }

        debug!("Committing connection for {}", id);
        connection
            .commit()
            .await
            .map_err(|e| TxError::CommitError(e.to_string()))?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back the connection's pending work
    ///
    /// No-op under the same conditions as [`commit`](Self::commit).
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;

        if !self.settings.strategy.is_self_managed() {
            return Ok(());
        }

        let id = self.id;
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        if connection
            .auto_commit()
            .await
            .map_err(|e| TxError::RollbackError(e.to_string()))?
        {
            return Ok(());
        }

        debug!("Rolling back connection for {}", id);
        connection
            .rollback()
            .await
            .map_err(|e| TxError::RollbackError(e.to_string()))?;
        self.in_transaction = false;
        Ok(())
    }

    /// Release the connection, if one was acquired
    ///
    /// A self-managed handle rolls back work left uncommitted since the last
    /// commit or rollback before releasing. The handle is closed afterwards
    /// even when releasing fails. Closing an already-closed handle is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == TransactionState::Closed {
            return Ok(());
        }

        self.state = TransactionState::Closed;
        self.source = None;

        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        if self.settings.strategy.is_self_managed() {
            if self.in_transaction {
                self.rollback_uncommitted(&mut connection).await;
                self.in_transaction = false;
            }
            if self.settings.reset_auto_commit_on_close {
                self.reset_auto_commit(&mut connection).await;
            }
        }

        debug!("Closing connection for {}", self.id);
        connection
            .close()
            .await
            .map_err(|e| TxError::CloseError(e.to_string()))
    }

    /// Configured statement timeout
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.ensure_open()?;
        Ok(self.settings.timeout)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == TransactionState::Closed {
            return Err(TxError::TransactionClosed(self.id.to_string()));
        }
        Ok(())
    }

    async fn open_connection(&self) -> Result<C> {
        let source = self.source.as_ref().ok_or_else(|| {
            TxError::AcquisitionError(format!("{} has no data source", self.id))
        })?;

        debug!("Opening connection for {}", self.id);
        let mut connection = source.get_connection().await.map_err(into_acquisition)?;

        if let Err(e) = self.configure(&mut connection).await {
            if let Err(close_err) = connection.close().await {
                warn!(
                    "Failed to close misconfigured connection for {}: {}",
                    self.id, close_err
                );
            }
            return Err(into_acquisition(e));
        }

        Ok(connection)
    }

    async fn configure(&self, connection: &mut C) -> Result<()> {
        if let Some(level) = self.isolation_level {
            debug!("Setting isolation level {} for {}", level, self.id);
            connection.set_isolation_level(level).await?;
        }

        if let Some(desired) = self.auto_commit {
            if connection.auto_commit().await? != desired {
                debug!("Setting autocommit to {} for {}", desired, self.id);
                connection.set_auto_commit(desired).await?;
            }
        }

        Ok(())
    }

    /// Failures are logged only; the connection is released regardless.
    async fn rollback_uncommitted(&self, connection: &mut C) {
        match connection.auto_commit().await {
            Ok(false) => {
                debug!("Rolling back uncommitted work for {} before close", self.id);
                if let Err(e) = connection.rollback().await {
                    warn!("Rollback before close failed for {}: {}", self.id, e);
                }
            }
            Ok(true) => {}
            Err(e) => debug!("Could not read autocommit for {}: {}", self.id, e),
        }
    }

    /// Some drivers hold a transaction open after a read and refuse to close
    /// until it is ended. Failures are logged only.
    async fn reset_auto_commit(&self, connection: &mut C) {
        match connection.auto_commit().await {
            Ok(false) => {
                debug!("Resetting autocommit to true for {}", self.id);
                if let Err(e) = connection.set_auto_commit(true).await {
                    debug!("Error resetting autocommit for {}: {}", self.id, e);
                }
            }
            Ok(true) => {}
            Err(e) => debug!("Could not read autocommit for {}: {}", self.id, e),
        }
    }
}

impl<C: Connection> std::fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("strategy", &self.settings.strategy)
            .field("isolation_level", &self.isolation_level)
            .field("auto_commit", &self.auto_commit)
            .finish()
    }
}

impl<C: Connection> Drop for Transaction<C> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            // close() is async and cannot run here
            warn!(
                "{} dropped without close(); connection released without cleanup",
                self.id
            );
        }
    }
}

fn into_acquisition(err: TxError) -> TxError {
    match err {
        TxError::AcquisitionError(_) => err,
        other => TxError::AcquisitionError(other.to_string()),
    }
}
