use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    #[error("Could not acquire connection: {0}")]
    AcquisitionError(String),

    #[error("Commit failed: {0}")]
    CommitError(String),

    #[error("Rollback failed: {0}")]
    RollbackError(String),

    #[error("Close failed: {0}")]
    CloseError(String),

    #[error("Transaction {0} is already closed")]
    TransactionClosed(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl TxError {
    /// True for the "operation on a closed handle" condition
    pub fn is_closed(&self) -> bool {
        matches!(self, TxError::TransactionClosed(_))
    }
}

pub type Result<T> = std::result::Result<T, TxError>;

impl<T> From<std::sync::PoisonError<T>> for TxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}
