// ============================================================================
// Transaction Module
// ============================================================================
//
// Transaction handles over a single connection, the factory that builds
// them, and a commit-or-rollback scope helper.
//
// ============================================================================

pub mod factory;
pub mod scope;
pub mod state;

pub use factory::TransactionFactory;
pub use scope::in_transaction;
pub use state::{Transaction, TransactionId, TransactionState};
