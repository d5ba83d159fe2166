//! Transaction manager facade.
//!
//! This module provides [`TransactionManager`], the entry point for
//! application code, and its builder. Every operation takes the
//! [`ContextId`] the transaction is bound to and delegates to the
//! transaction currently bound there.

use crate::config::{IdStrategy, TransactionManagerConfig};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, trace};
use xatm_concurrency::{
    CompositeGenerator, NamedSequenceGenerator, Transaction, TransactionMetrics,
    TransactionRegistry, XidGenerator,
};
use xatm_core::{ContextId, Status, TransactionError};

/// The transaction manager.
///
/// Cheap to clone; clones share the same context bindings.
///
/// # Example
///
/// ```
/// use xatm::prelude::*;
///
/// let tm = TransactionManager::builder().unique_name("node-1").build()?;
/// let ctx = ContextId::new();
///
/// let txn = tm.begin(ctx)?;
/// // txn.enlist(participant)?; txn.register_listener(listener)?;
/// assert_eq!(tm.status(ctx), Status::Active);
///
/// tm.commit(ctx)?;
/// assert_eq!(txn.status(), Status::Committed);
/// assert_eq!(tm.status(ctx), Status::NoTransaction);
/// # Ok::<(), xatm::Error>(())
/// ```
#[derive(Clone)]
pub struct TransactionManager {
    registry: TransactionRegistry,
    config: Arc<TransactionManagerConfig>,
}

impl TransactionManager {
    /// Create a manager with default settings (composite identifiers,
    /// 30 second timeout)
    pub fn new() -> Self {
        Self::from_parts(
            TransactionManagerConfig::default(),
            Arc::new(CompositeGenerator::new()),
        )
    }

    /// Create a builder for manager configuration.
    pub fn builder() -> TransactionManagerBuilder {
        TransactionManagerBuilder::new()
    }

    fn from_parts(config: TransactionManagerConfig, generator: Arc<dyn XidGenerator>) -> Self {
        TransactionManager {
            registry: TransactionRegistry::with_default_timeout(
                generator,
                config.default_timeout_secs,
            ),
            config: Arc::new(config),
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &TransactionManagerConfig {
        &self.config
    }

    /// Begin a transaction and bind it to `context`.
    ///
    /// The returned handle is the bound transaction; participants and
    /// listeners are enlisted on it.
    pub fn begin(&self, context: ContextId) -> Result<Arc<Transaction>> {
        trace!(%context, "begin()");
        Ok(self.registry.begin(context)?)
    }

    /// Commit the transaction bound to `context`.
    pub fn commit(&self, context: ContextId) -> Result<()> {
        trace!(%context, "commit()");
        Ok(self.registry.current(context)?.commit()?)
    }

    /// Roll back the transaction bound to `context`.
    pub fn rollback(&self, context: ContextId) -> Result<()> {
        trace!(%context, "rollback()");
        Ok(self.registry.current(context)?.rollback()?)
    }

    /// Status of the transaction bound to `context`, or
    /// [`Status::NoTransaction`].
    pub fn status(&self, context: ContextId) -> Status {
        self.registry.status(context)
    }

    /// The transaction bound to `context`.
    pub fn transaction(&self, context: ContextId) -> Result<Arc<Transaction>> {
        Ok(self.registry.current(context)?)
    }

    /// Doom the transaction bound to `context`.
    pub fn set_rollback_only(&self, context: ContextId) -> Result<()> {
        trace!(%context, "set_rollback_only()");
        Ok(self.registry.current(context)?.set_rollback_only()?)
    }

    /// Change the timeout of the transaction bound to `context`.
    ///
    /// Zero restores the configured default; negative values are rejected.
    pub fn set_transaction_timeout(&self, context: ContextId, seconds: i64) -> Result<()> {
        trace!(%context, seconds, "set_transaction_timeout()");
        Ok(self.registry.current(context)?.set_timeout(seconds)?)
    }

    /// Transaction suspension is not supported.
    pub fn suspend(&self, context: ContextId) -> Result<Arc<Transaction>> {
        trace!(%context, "suspend()");
        Err(TransactionError::NotSupported("transaction suspension").into())
    }

    /// Transaction suspension is not supported.
    pub fn resume(&self, context: ContextId, transaction: &Arc<Transaction>) -> Result<()> {
        trace!(%context, xid = %transaction.xid(), "resume()");
        Err(TransactionError::NotSupported("transaction suspension").into())
    }

    /// Number of contexts with a bound transaction
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.registry.metrics()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("active", &self.registry.active_count())
            .finish()
    }
}

/// Builder for manager configuration.
///
/// # Example
///
/// ```
/// use xatm::TransactionManager;
///
/// // Cluster deployment: every node gets a distinct name
/// let tm = TransactionManager::builder()
///     .unique_name("orders-node-3")
///     .default_timeout(60)
///     .build()?;
///
/// // Single process: host address based identifiers
/// let tm = TransactionManager::builder().composite_ids().build()?;
/// # Ok::<(), xatm::Error>(())
/// ```
pub struct TransactionManagerBuilder {
    config: TransactionManagerConfig,
    generator: Option<Arc<dyn XidGenerator>>,
}

impl TransactionManagerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(TransactionManagerConfig::default())
    }

    /// Start from an existing configuration.
    pub fn from_config(config: TransactionManagerConfig) -> Self {
        Self {
            config,
            generator: None,
        }
    }

    /// Set the cluster-unique name and switch to named-sequence identifiers.
    pub fn unique_name(mut self, name: impl Into<String>) -> Self {
        self.config.unique_name = Some(name.into());
        self.config.id_strategy = IdStrategy::NamedSequence;
        self
    }

    /// Use named-sequence identifiers (requires [`unique_name`](Self::unique_name)).
    pub fn named_sequence_ids(mut self) -> Self {
        self.config.id_strategy = IdStrategy::NamedSequence;
        self
    }

    /// Use composite host/sequence/context/random identifiers.
    pub fn composite_ids(mut self) -> Self {
        self.config.id_strategy = IdStrategy::Composite;
        self
    }

    /// Timeout for new transactions in seconds.
    pub fn default_timeout(mut self, seconds: u32) -> Self {
        self.config.default_timeout_secs = seconds;
        self
    }

    /// Use a custom identifier generator; overrides the strategy.
    pub fn generator(mut self, generator: Arc<dyn XidGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the default timeout is zero, or if named-sequence
    /// identifiers are selected without a usable unique name.
    pub fn build(self) -> Result<TransactionManager> {
        let config = self.config;
        if config.default_timeout_secs == 0 {
            return Err(Error::Config("default timeout must be positive".to_string()));
        }

        let generator: Arc<dyn XidGenerator> = match (self.generator, config.id_strategy) {
            (Some(generator), _) => generator,
            (None, IdStrategy::Composite) => Arc::new(CompositeGenerator::new()),
            (None, IdStrategy::NamedSequence) => {
                let name = config.unique_name.clone().ok_or_else(|| {
                    Error::Config("named-sequence identifiers require a unique name".to_string())
                })?;
                let generator = NamedSequenceGenerator::new(name).ok_or_else(|| {
                    Error::Config(format!(
                        "unique name must be 1 to {} bytes",
                        NamedSequenceGenerator::MAX_NAME_LEN
                    ))
                })?;
                Arc::new(generator)
            }
        };

        debug!(
            strategy = ?config.id_strategy,
            default_timeout_secs = config.default_timeout_secs,
            "Transaction manager configured"
        );
        Ok(TransactionManager::from_parts(config, generator))
    }
}

impl Default for TransactionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
