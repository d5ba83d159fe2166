//! Unified error type for xatm.
//!
//! Wraps the coordinator's [`TransactionError`] and adds configuration
//! failures, presenting one error type at the facade.

use thiserror::Error;
use xatm_core::TransactionError;

/// All xatm errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Transaction operation failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Invalid manager configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for xatm operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The underlying transaction error, if any
    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            Error::Transaction(e) => Some(e),
            Error::Config(_) => None,
        }
    }

    /// The transaction was, or must be, rolled back.
    pub fn is_rollback(&self) -> bool {
        self.transaction_error().is_some_and(TransactionError::is_rollback)
    }

    /// The call was rejected because of transaction state.
    pub fn is_illegal_state(&self) -> bool {
        self.transaction_error()
            .is_some_and(TransactionError::is_illegal_state)
    }

    /// Unexpected failure inside the coordinator or a participant.
    pub fn is_system_failure(&self) -> bool {
        self.transaction_error()
            .is_some_and(TransactionError::is_system_failure)
    }

    /// Participants may now disagree about the outcome.
    ///
    /// Always worth alerting on: this is the one failure the coordinator
    /// cannot resolve on its own.
    pub fn is_possibly_inconsistent(&self) -> bool {
        self.transaction_error()
            .is_some_and(TransactionError::is_possibly_inconsistent)
    }

    /// Declared unsupported operation (nested begin, suspend, resume).
    pub fn is_not_supported(&self) -> bool {
        self.transaction_error()
            .is_some_and(TransactionError::is_not_supported)
    }
}
