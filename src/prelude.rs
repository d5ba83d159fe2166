//! Convenient imports for xatm.
//!
//! ```ignore
//! use xatm::prelude::*;
//!
//! let tm = TransactionManager::new();
//! let txn = tm.begin(ContextId::new())?;
//! ```

// Main entry point
pub use crate::manager::{TransactionManager, TransactionManagerBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Coordinator
pub use xatm_concurrency::Transaction;

// Capabilities implemented by resource adapters
pub use xatm_core::{CompletionListener, Participant};

// Core types
pub use xatm_core::{ContextId, EndFlag, StartFlags, Status, TransactionId, Vote, XaError};
