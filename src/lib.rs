//! # xatm
//!
//! Embeddable XA two-phase-commit transaction coordinator.
//!
//! xatm lets a caller enlist several independent resource managers
//! (database connections, message-queue sessions, ...) into one atomic unit
//! of work and drive them through prepare/commit or rollback, with defined
//! partial-failure semantics.
//!
//! ## Quick Start
//!
//! ```ignore
//! use xatm::prelude::*;
//!
//! let tm = TransactionManager::builder().unique_name("node-1").build()?;
//! let ctx = ContextId::new();
//!
//! let txn = tm.begin(ctx)?;
//! txn.enlist(orders_db.clone())?;
//! txn.enlist(events_queue.clone())?;
//!
//! match tm.commit(ctx) {
//!     Ok(()) => {}
//!     Err(e) if e.is_possibly_inconsistent() => alert(e),
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! ## Layers
//!
//! - [`TransactionManager`] - facade; binds one transaction per [`ContextId`]
//! - [`Transaction`] - coordinator; state machine and two-phase commit
//! - [`XidGenerator`] - named-sequence or composite transaction identifiers
//!
//! ## Failure Classification
//!
//! | Error | Transaction outcome |
//! |-------|---------------------|
//! | `PrepareFailed` | rolled back |
//! | `PartialOutcome` | committed or rolled back, but some participants failed |
//! | `MarkedForRollback` | not completed; roll back |
//! | `ResourceManager` | unchanged; a participant call failed |
//!
//! No durable log is kept and nothing is retried automatically.

#![warn(missing_docs)]

mod config;
mod error;
mod manager;

pub mod prelude;

// Re-export main entry points
pub use config::{IdStrategy, TransactionManagerConfig};
pub use error::{Error, Result};
pub use manager::{TransactionManager, TransactionManagerBuilder};

// Re-export coordinator layers
pub use xatm_concurrency::{
    CompositeGenerator, NamedSequenceGenerator, Transaction, TransactionMetrics, XidGenerator,
    COMPOSITE_FORMAT_ID, DEFAULT_TIMEOUT_SECS, NAMED_SEQUENCE_FORMAT_ID,
};

// Re-export core types
pub use xatm_core::error as xa;
pub use xatm_core::{
    CompletionListener, CompletionPhase, ContextId, EndFlag, Participant, StartFlags, Status,
    TransactionError, TransactionId, Vote, XaError,
};
