pub mod error;
pub mod isolation;

pub use error::{Result, TxError};
pub use isolation::IsolationLevel;
