use crate::core::{IsolationLevel, Result, TxError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Who owns transaction boundaries
///
/// ```text
/// SelfManaged       commit/rollback are forwarded to the connection
/// ContainerManaged  commit/rollback are no-ops; an external coordinator
///                   commits or rolls back the same connection
/// ```
///
/// Connection ownership is independent of this: `close` releases the
/// connection under both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelegationStrategy {
    #[default]
    SelfManaged,
    ContainerManaged,
}

impl DelegationStrategy {
    pub fn is_self_managed(&self) -> bool {
        matches!(self, DelegationStrategy::SelfManaged)
    }
}

impl std::fmt::Display for DelegationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelegationStrategy::SelfManaged => write!(f, "SELF_MANAGED"),
            DelegationStrategy::ContainerManaged => write!(f, "CONTAINER_MANAGED"),
        }
    }
}

impl FromStr for DelegationStrategy {
    type Err = TxError;

    /// `JDBC` / `MANAGED` are accepted as aliases
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "jdbc" | "self" | "self-managed" => Ok(DelegationStrategy::SelfManaged),
            "managed" | "container" | "container-managed" => {
                Ok(DelegationStrategy::ContainerManaged)
            }
            _ => Err(TxError::ConfigError(format!(
                "Unknown transaction strategy '{}'",
                s
            ))),
        }
    }
}

/// Transaction factory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Whether handles forward commit/rollback themselves
    pub strategy: DelegationStrategy,

    /// Isolation level used by `TransactionFactory::open`
    pub isolation_level: Option<IsolationLevel>,

    /// Auto-commit mode used by `TransactionFactory::open`
    pub auto_commit: bool,

    /// Statement timeout reported by handles
    #[serde(with = "timeout_secs")]
    pub timeout: Option<Duration>,

    /// Leave auto-commit untouched when a self-managed handle closes
    pub skip_auto_commit_reset_on_close: bool,
}

impl TransactionConfig {
    /// Self-managed, driver-default isolation, auto-commit off, no timeout
    pub fn new() -> Self {
        Self {
            strategy: DelegationStrategy::SelfManaged,
            isolation_level: None,
            auto_commit: false,
            timeout: None,
            skip_auto_commit_reset_on_close: false,
        }
    }

    /// Set the delegation strategy
    pub fn strategy(mut self, strategy: DelegationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the default isolation level
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Set the default auto-commit mode
    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Set the statement timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn skip_auto_commit_reset_on_close(mut self, skip: bool) -> Self {
        self.skip_auto_commit_reset_on_close = skip;
        self
    }

    /// Build from a flat property map
    ///
    /// Recognized keys: `type` (or `strategy`), `isolation_level`,
    /// `auto_commit`, `timeout_secs`, `skip_set_autocommit_on_close`.
    /// Unknown keys are ignored.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::new();
        config.apply_properties(props)?;
        Ok(config)
    }

    /// Overlay properties onto this configuration
    pub fn apply_properties(&mut self, props: &HashMap<String, String>) -> Result<()> {
        if let Some(value) = props.get("type").or_else(|| props.get("strategy")) {
            self.strategy = value.parse()?;
        }

        if let Some(value) = props.get("isolation_level") {
            self.isolation_level = Some(value.parse()?);
        }

        if let Some(value) = props.get("auto_commit") {
            self.auto_commit = parse_bool("auto_commit", value)?;
        }

        if let Some(value) = props.get("timeout_secs") {
            let secs: u64 = value.trim().parse().map_err(|_| {
                TxError::ConfigError(format!("Invalid timeout_secs '{}'", value))
            })?;
            self.timeout = Some(Duration::from_secs(secs));
        }

        if let Some(value) = props.get("skip_set_autocommit_on_close") {
            self.skip_auto_commit_reset_on_close =
                parse_bool("skip_set_autocommit_on_close", value)?;
        }

        self.validate()
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout == Some(Duration::ZERO) {
            return Err(TxError::ConfigError(
                "timeout must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(TxError::ConfigError(format!(
            "Invalid boolean for {}: '{}'",
            key, value
        ))),
    }
}

mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        timeout: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match timeout {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = TransactionConfig::default();
        assert_eq!(config.strategy, DelegationStrategy::SelfManaged);
        assert_eq!(config.isolation_level, None);
        assert!(!config.auto_commit);
        assert_eq!(config.timeout, None);
        assert!(!config.skip_auto_commit_reset_on_close);
    }

    #[test]
    fn test_builder_pattern() {
        let config = TransactionConfig::new()
            .strategy(DelegationStrategy::ContainerManaged)
            .isolation_level(IsolationLevel::Serializable)
            .auto_commit(true)
            .timeout(Duration::from_secs(5));

        assert_eq!(config.strategy, DelegationStrategy::ContainerManaged);
        assert_eq!(config.isolation_level, Some(IsolationLevel::Serializable));
        assert!(config.auto_commit);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_strategy_aliases() {
        assert_eq!(
            "JDBC".parse::<DelegationStrategy>().unwrap(),
            DelegationStrategy::SelfManaged
        );
        assert_eq!(
            "MANAGED".parse::<DelegationStrategy>().unwrap(),
            DelegationStrategy::ContainerManaged
        );
        assert_eq!(
            "container_managed".parse::<DelegationStrategy>().unwrap(),
            DelegationStrategy::ContainerManaged
        );
        assert!("xa".parse::<DelegationStrategy>().is_err());
    }

    #[test]
    fn test_from_properties() {
        let config = TransactionConfig::from_properties(&props(&[
            ("type", "MANAGED"),
            ("isolation_level", "READ_COMMITTED"),
            ("auto_commit", "yes"),
            ("timeout_secs", "30"),
            ("skip_set_autocommit_on_close", "true"),
            ("unrelated", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.strategy, DelegationStrategy::ContainerManaged);
        assert_eq!(config.isolation_level, Some(IsolationLevel::ReadCommitted));
        assert!(config.auto_commit);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.skip_auto_commit_reset_on_close);
    }

    #[test]
    fn test_invalid_properties() {
        assert!(TransactionConfig::from_properties(&props(&[("auto_commit", "maybe")])).is_err());
        assert!(TransactionConfig::from_properties(&props(&[("timeout_secs", "-1")])).is_err());
        assert!(TransactionConfig::from_properties(&props(&[("timeout_secs", "0")])).is_err());
        assert!(
            TransactionConfig::from_properties(&props(&[("isolation_level", "chaos")])).is_err()
        );
    }

    #[test]
    fn test_from_json() {
        let config = TransactionConfig::from_json(
            r#"{"strategy": "container-managed", "isolation_level": "REPEATABLE_READ", "timeout": 10}"#,
        )
        .unwrap();

        assert_eq!(config.strategy, DelegationStrategy::ContainerManaged);
        assert_eq!(config.isolation_level, Some(IsolationLevel::RepeatableRead));
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert!(!config.auto_commit);
    }

    #[test]
    fn test_json_rejects_bad_document() {
        let err = TransactionConfig::from_json(r#"{"strategy": "xa"}"#).unwrap_err();
        assert!(matches!(err, TxError::ConfigError(_)));
    }
}
