//! Transaction context registry
//!
//! Binds at most one [`Transaction`] to each execution context.
//!
//! ## Binding Lifecycle
//!
//! ```text
//! 1. begin(ctx)  - atomic check-then-bind on the context's map entry
//! 2. ...         - caller enlists participants, registers listeners
//! 3. commit/rollback on the transaction
//! 4. after_completion - the registry's own listener unbinds ctx
//! ```
//!
//! The registry registers a listener on every transaction it creates; that
//! listener holds only weak references back to the registry and the
//! transaction, so an abandoned registry does not keep transactions alive.

use crate::transaction::{Transaction, DEFAULT_TIMEOUT_SECS};
use crate::xid::XidGenerator;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use xatm_core::{CompletionListener, ContextId, Result, Status, TransactionError};

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionMetrics {
    /// Transactions begun
    pub begun: u64,
    /// Transactions that reached COMMITTED
    pub committed: u64,
    /// Transactions that reached ROLLEDBACK
    pub rolled_back: u64,
    /// Commit or rollback passes where some participants failed
    pub partial_outcomes: u64,
    /// Transactions currently bound to a context
    pub active: u64,
}

impl TransactionMetrics {
    /// Fraction of completed transactions that committed (0.0 - 1.0)
    pub fn commit_rate(&self) -> f64 {
        let completed = self.committed + self.rolled_back;
        if completed == 0 {
            0.0
        } else {
            self.committed as f64 / completed as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    partial_outcomes: AtomicU64,
}

struct RegistryInner {
    bindings: DashMap<ContextId, Arc<Transaction>>,
    generator: Arc<dyn XidGenerator>,
    default_timeout_secs: u32,
    counters: Counters,
}

/// Binds one transaction per execution context.
///
/// Cheap to clone; clones share the same bindings.
#[derive(Clone)]
pub struct TransactionRegistry {
    inner: Arc<RegistryInner>,
}

impl TransactionRegistry {
    /// Create a registry using the given identifier generator
    pub fn new(generator: Arc<dyn XidGenerator>) -> Self {
        Self::with_default_timeout(generator, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a registry whose transactions start with a different timeout
    pub fn with_default_timeout(generator: Arc<dyn XidGenerator>, default_timeout_secs: u32) -> Self {
        TransactionRegistry {
            inner: Arc::new(RegistryInner {
                bindings: DashMap::new(),
                generator,
                default_timeout_secs,
                counters: Counters::default(),
            }),
        }
    }

    /// Begin a transaction on `context`
    ///
    /// # Errors
    ///
    /// `NestedNotSupported` if the context already has a transaction; that
    /// transaction is left untouched.
    pub fn begin(&self, context: ContextId) -> Result<Arc<Transaction>> {
        trace!(%context, "begin()");
        match self.inner.bindings.entry(context) {
            Entry::Occupied(_) => {
                debug!(%context, "Transaction already started");
                Err(TransactionError::NestedNotSupported { context })
            }
            Entry::Vacant(slot) => {
                let xid = self.inner.generator.generate(context);
                let transaction = Arc::new(Transaction::with_default_timeout(
                    xid,
                    self.inner.default_timeout_secs,
                ));
                transaction.register_listener(Arc::new(ContextBinding {
                    registry: Arc::downgrade(&self.inner),
                    transaction: Arc::downgrade(&transaction),
                    context,
                }))?;
                slot.insert(transaction.clone());
                self.inner.counters.begun.fetch_add(1, Ordering::Relaxed);
                debug!(%context, xid = %transaction.xid(), "Transaction begun");
                Ok(transaction)
            }
        }
    }

    /// The transaction bound to `context`
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` if none is bound.
    pub fn current(&self, context: ContextId) -> Result<Arc<Transaction>> {
        self.inner
            .bindings
            .get(&context)
            .map(|entry| entry.value().clone())
            .ok_or(TransactionError::NoActiveTransaction { context })
    }

    /// Status of the transaction bound to `context`, or `NoTransaction`
    pub fn status(&self, context: ContextId) -> Status {
        self.inner
            .bindings
            .get(&context)
            .map(|entry| entry.value().status())
            .unwrap_or(Status::NoTransaction)
    }

    /// Number of contexts with a bound transaction
    pub fn active_count(&self) -> usize {
        self.inner.bindings.len()
    }

    /// Snapshot of the transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        let counters = &self.inner.counters;
        TransactionMetrics {
            begun: counters.begun.load(Ordering::Relaxed),
            committed: counters.committed.load(Ordering::Relaxed),
            rolled_back: counters.rolled_back.load(Ordering::Relaxed),
            partial_outcomes: counters.partial_outcomes.load(Ordering::Relaxed),
            active: self.inner.bindings.len() as u64,
        }
    }
}

/// Unbinds a finished transaction from its context.
struct ContextBinding {
    registry: Weak<RegistryInner>,
    transaction: Weak<Transaction>,
    context: ContextId,
}

impl CompletionListener for ContextBinding {
    fn before_completion(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_completion(&self, status: Status) -> anyhow::Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let Some(transaction) = self.transaction.upgrade() else {
            return Ok(());
        };

        registry
            .bindings
            .remove_if(&self.context, |_, bound| Arc::ptr_eq(bound, &transaction));
        debug!(context = %self.context, xid = %transaction.xid(), %status, "Transaction unbound");

        let counters = &registry.counters;
        match status {
            Status::Committed => counters.committed.fetch_add(1, Ordering::Relaxed),
            _ => counters.rolled_back.fetch_add(1, Ordering::Relaxed),
        };
        if transaction.is_possibly_inconsistent() {
            counters.partial_outcomes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
