use super::Transaction;
use super::state::HandleSettings;
use crate::config::{DelegationStrategy, TransactionConfig};
use crate::connection::{Connection, DataSource};
use crate::core::{IsolationLevel, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Produces [`Transaction`] handles
///
/// The delegation strategy, timeout and close behavior come from the
/// factory's [`TransactionConfig`]; isolation level and auto-commit may be
/// given per transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionFactory {
    config: TransactionConfig,
}

impl TransactionFactory {
    pub fn new(config: TransactionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Factory whose handles commit and roll back themselves
    pub fn self_managed() -> Self {
        Self {
            config: TransactionConfig::new().strategy(DelegationStrategy::SelfManaged),
        }
    }

    /// Factory whose handles leave commit and rollback to an external coordinator
    pub fn container_managed() -> Self {
        Self {
            config: TransactionConfig::new().strategy(DelegationStrategy::ContainerManaged),
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Reconfigure from a property map
    ///
    /// On error the previous configuration is kept.
    pub fn set_properties(&mut self, props: &HashMap<String, String>) -> Result<()> {
        let mut config = self.config.clone();
        config.apply_properties(props)?;
        self.config = config;
        Ok(())
    }

    /// New handle bound lazily to `source`
    ///
    /// No connection is acquired until the handle's first `get_connection`.
    pub fn new_transaction<D>(
        &self,
        source: Arc<D>,
        isolation_level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Transaction<D::Connection>
    where
        D: DataSource + 'static,
    {
        let source: Arc<dyn DataSource<Connection = D::Connection>> = source;
        Transaction::from_source(source, isolation_level, auto_commit, self.settings())
    }

    /// New handle using the configured default isolation level and auto-commit
    pub fn open<D>(&self, source: Arc<D>) -> Transaction<D::Connection>
    where
        D: DataSource + 'static,
    {
        self.new_transaction(source, self.config.isolation_level, self.config.auto_commit)
    }

    /// Handle over a connection acquired elsewhere
    ///
    /// The connection's isolation level and auto-commit are left as they are.
    pub fn wrap_existing<C: Connection>(&self, connection: C) -> Transaction<C> {
        Transaction::from_connection(connection, self.settings())
    }

    fn settings(&self) -> HandleSettings {
        HandleSettings {
            strategy: self.config.strategy,
            timeout: self.config.timeout,
            reset_auto_commit_on_close: !self.config.skip_auto_commit_reset_on_close,
        }
    }
}
