// ============================================================================
// txmanage Library
// ============================================================================

pub mod config;
pub mod connection;
pub mod core;
pub mod transaction;

use std::sync::Arc;

// Re-export main types for convenience
pub use crate::config::{DelegationStrategy, TransactionConfig};
pub use crate::connection::{Connection, DataSource};
pub use crate::core::{IsolationLevel, Result, TxError};
pub use crate::transaction::{
    Transaction, TransactionFactory, TransactionId, TransactionState, in_transaction,
};

/// Open a self-managed transaction with explicit commit against `source`
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use txmanage::{IsolationLevel, begin};
/// use txmanage::connection::memory::MemoryDataSource;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = Arc::new(MemoryDataSource::new());
/// let mut tx = begin(Arc::clone(&source), IsolationLevel::ReadCommitted);
///
/// tx.get_connection().await?.execute("UPDATE accounts SET balance = 0")?;
/// tx.commit().await?;
/// tx.close().await?;
///
/// assert_eq!(source.committed()?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub fn begin<D>(source: Arc<D>, isolation_level: IsolationLevel) -> Transaction<D::Connection>
where
    D: DataSource + 'static,
{
    TransactionFactory::self_managed().new_transaction(source, Some(isolation_level), false)
}
