//! Error types for the transaction coordinator
//!
//! Two layers:
//! - [`XaError`]: what a participant (resource manager) reports, carrying an
//!   XA error code
//! - [`TransactionError`]: what coordinator operations report to callers
//!
//! ## Rollback-class codes
//!
//! | Code | Value | Meaning |
//! |------|-------|---------|
//! | XA_RBROLLBACK | 100 | Rolled back, unspecified reason |
//! | XA_RBCOMMFAIL | 101 | Communication failure |
//! | XA_RBDEADLOCK | 102 | Deadlock detected |
//! | XA_RBINTEGRITY | 103 | Integrity violation |
//! | XA_RBOTHER | 104 | Other reason |
//! | XA_RBPROTO | 105 | Protocol error |
//! | XA_RBTIMEOUT | 106 | Branch took too long |
//! | XA_RBTRANSIENT | 107 | May retry the branch |
//!
//! A participant that fails prepare with one of these has already rolled its
//! branch back and needs no further calls.

use crate::types::{ContextId, Status, TransactionId};
use thiserror::Error;

/// Lower bound of the rollback-class codes.
pub const XA_RBBASE: i32 = 100;
/// Rollback caused by an unspecified reason.
pub const XA_RBROLLBACK: i32 = XA_RBBASE;
/// Rollback caused by a communication failure.
pub const XA_RBCOMMFAIL: i32 = XA_RBBASE + 1;
/// A deadlock was detected.
pub const XA_RBDEADLOCK: i32 = XA_RBBASE + 2;
/// A condition violating the integrity of the resource was detected.
pub const XA_RBINTEGRITY: i32 = XA_RBBASE + 3;
/// Rolled back for a reason not listed.
pub const XA_RBOTHER: i32 = XA_RBBASE + 4;
/// A protocol error occurred in the resource manager.
pub const XA_RBPROTO: i32 = XA_RBBASE + 5;
/// The branch took too long.
pub const XA_RBTIMEOUT: i32 = XA_RBBASE + 6;
/// The branch may be retried.
pub const XA_RBTRANSIENT: i32 = XA_RBBASE + 7;
/// Upper bound of the rollback-class codes.
pub const XA_RBEND: i32 = XA_RBTRANSIENT;

/// Asynchronous operation already outstanding.
pub const XAER_ASYNC: i32 = -2;
/// Resource manager error in the branch.
pub const XAER_RMERR: i32 = -3;
/// The Xid is not valid.
pub const XAER_NOTA: i32 = -4;
/// Invalid arguments.
pub const XAER_INVAL: i32 = -5;
/// Routine invoked in an improper context.
pub const XAER_PROTO: i32 = -6;
/// Resource manager unavailable.
pub const XAER_RMFAIL: i32 = -7;
/// The Xid already exists.
pub const XAER_DUPID: i32 = -8;
/// Resource manager doing work outside the global transaction.
pub const XAER_OUTSIDE: i32 = -9;

/// Error reported by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("xa error {code}: {message}")]
pub struct XaError {
    /// XA error code
    pub code: i32,
    /// Resource-manager specific description
    pub message: String,
}

impl XaError {
    /// Create an error with the given XA code
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The participant has unilaterally rolled its branch back
    pub fn is_rollback_class(&self) -> bool {
        (XA_RBBASE..=XA_RBEND).contains(&self.code)
    }
}

/// Which completion pass produced a partial outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPhase {
    /// Second phase of two-phase commit
    Commit,
    /// Rollback pass
    Rollback,
}

impl std::fmt::Display for CompletionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionPhase::Commit => f.write_str("commit"),
            CompletionPhase::Rollback => f.write_str("rollback"),
        }
    }
}

/// Errors from coordinator, registry and facade operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// begin() while a transaction is already bound to the context
    #[error("nested transactions not supported: {context} already has a transaction")]
    NestedNotSupported {
        /// Context that already has a transaction
        context: ContextId,
    },

    /// Operation needs a bound transaction and there is none
    #[error("no transaction active for {context}")]
    NoActiveTransaction {
        /// Context that was queried
        context: ContextId,
    },

    /// Operation not permitted in the current status
    #[error("transaction status is {status}; {operation} not possible")]
    IllegalState {
        /// Rejected operation
        operation: &'static str,
        /// Status at the time of the call
        status: Status,
    },

    /// The participant is already enlisted in this transaction
    #[error("participant already enlisted")]
    AlreadyEnlisted,

    /// The transaction is doomed and only accepts rollback
    #[error("transaction is marked for rollback; {operation} not possible")]
    MarkedForRollback {
        /// Rejected operation
        operation: &'static str,
    },

    /// Prepare failed; the transaction has been rolled back
    #[error("transaction {xid} could not be prepared and was rolled back")]
    PrepareFailed {
        /// Transaction id
        xid: TransactionId,
    },

    /// Some participants failed after the point of no return
    #[error(
        "transaction {xid}: {phase} failed on {failed} of {attempted} participants; data may be inconsistent"
    )]
    PartialOutcome {
        /// Transaction id
        xid: TransactionId,
        /// Pass that partially failed
        phase: CompletionPhase,
        /// Participants whose call failed
        failed: usize,
        /// Participants the pass attempted
        attempted: usize,
    },

    /// Unexpected participant failure
    #[error("resource manager failure during {operation}: {source}")]
    ResourceManager {
        /// Coordinator operation that called the participant
        operation: &'static str,
        /// Participant error
        #[source]
        source: XaError,
    },

    /// Negative or out-of-range timeout
    #[error("invalid transaction timeout: {0} seconds")]
    InvalidTimeout(i64),

    /// Malformed transaction identifier
    #[error("invalid transaction id: {0}")]
    InvalidXid(String),

    /// Declared permanent limitation
    #[error("{0} not supported")]
    NotSupported(&'static str),
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, TransactionError>;

impl TransactionError {
    /// The transaction was, or must be, rolled back
    pub fn is_rollback(&self) -> bool {
        matches!(
            self,
            TransactionError::MarkedForRollback { .. } | TransactionError::PrepareFailed { .. }
        )
    }

    /// The call was rejected because of transaction state
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            TransactionError::IllegalState { .. }
                | TransactionError::AlreadyEnlisted
                | TransactionError::NoActiveTransaction { .. }
        )
    }

    /// Unexpected failure inside the coordinator or a participant
    pub fn is_system_failure(&self) -> bool {
        matches!(
            self,
            TransactionError::PartialOutcome { .. }
                | TransactionError::ResourceManager { .. }
                | TransactionError::InvalidTimeout(_)
        )
    }

    /// Participants may now disagree about the outcome
    pub fn is_possibly_inconsistent(&self) -> bool {
        matches!(self, TransactionError::PartialOutcome { .. })
    }

    /// Nested begin, suspend, resume and delist
    pub fn is_not_supported(&self) -> bool {
        matches!(
            self,
            TransactionError::NestedNotSupported { .. } | TransactionError::NotSupported(_)
        )
    }
}
