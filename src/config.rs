//! Transaction manager configuration.

use serde::{Deserialize, Serialize};
use xatm_concurrency::DEFAULT_TIMEOUT_SECS;

/// How transaction identifiers are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// `"<unique-name>-<seq>"`; requires a cluster-unique name
    NamedSequence,
    /// Host address + sequence + context + random
    #[default]
    Composite,
}

/// Configuration for a [`TransactionManager`](crate::TransactionManager).
///
/// ```
/// use xatm::{IdStrategy, TransactionManagerConfig};
///
/// let config = TransactionManagerConfig::default();
/// assert_eq!(config.id_strategy, IdStrategy::Composite);
/// assert_eq!(config.default_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionManagerConfig {
    /// Cluster-unique name; required by the named-sequence strategy
    pub unique_name: Option<String>,
    /// Identifier strategy
    pub id_strategy: IdStrategy,
    /// Timeout for new transactions, and the value zero resets to
    pub default_timeout_secs: u32,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        TransactionManagerConfig {
            unique_name: None,
            id_strategy: IdStrategy::default(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
