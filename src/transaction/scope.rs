use super::Transaction;
use crate::connection::Connection;
use crate::core::Result;
use futures::future::BoxFuture;
use log::warn;

/// Run `work` inside `tx` and close it
///
/// Commits when `work` succeeds and rolls back when it fails. The handle is
/// closed in every case. The first error wins: a rollback or close failure
/// after a failed `work` is logged, not returned.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use txmanage::{TransactionFactory, in_transaction};
/// # use txmanage::connection::memory::MemoryDataSource;
/// # #[tokio::main]
/// # async fn main() -> txmanage::Result<()> {
/// let source = Arc::new(MemoryDataSource::new());
/// let mut tx = TransactionFactory::self_managed().new_transaction(source, None, false);
///
/// in_transaction(&mut tx, |conn| {
///     Box::pin(async move { conn.execute("INSERT INTO users VALUES (1)") })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn in_transaction<C, T, F>(tx: &mut Transaction<C>, work: F) -> Result<T>
where
    C: Connection,
    F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<T>>,
{
    let outcome = match tx.get_connection().await {
        Ok(connection) => work(connection).await,
        Err(e) => Err(e),
    };

    let outcome = match outcome {
        Ok(value) => match tx.commit().await {
            Ok(()) => Ok(value),
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        },
        Err(e) => {
            rollback_quietly(tx).await;
            Err(e)
        }
    };

    let closed = tx.close().await;

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Failed to close {} after error: {}", tx.id(), close_err);
            Err(e)
        }
    }
}

async fn rollback_quietly<C: Connection>(tx: &mut Transaction<C>) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback of {} failed: {}", tx.id(), e);
    }
}
