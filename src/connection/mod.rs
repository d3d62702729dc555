pub mod memory;

use crate::core::{IsolationLevel, Result};
use async_trait::async_trait;

/// A connection-like resource a transaction can drive
///
/// Implement this for a real driver connection (Postgres, MySQL, ...) or use
/// [`memory::MemoryConnection`] in tests.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Current auto-commit mode of the connection
    async fn auto_commit(&self) -> Result<bool>;

    /// Switch auto-commit mode on or off
    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    /// Apply an isolation level to subsequent transactions on this connection
    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;

    /// Make pending work durable
    async fn commit(&mut self) -> Result<()>;

    /// Discard pending work
    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection
    async fn close(&mut self) -> Result<()>;
}

/// Something that produces fresh connections on demand
///
/// Acquisition may block on network I/O; bounding it with a timeout is the
/// caller's job.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Connection: Connection;

    async fn get_connection(&self) -> Result<Self::Connection>;
}
