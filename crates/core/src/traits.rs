//! Capabilities the coordinator consumes and exposes
//!
//! - [`Participant`]: an XA resource manager branch (database connection,
//!   message-queue session, ...). Implemented by resource adapters.
//! - [`CompletionListener`]: callbacks around transaction completion, used
//!   by adapters to defer closing pooled connections.
//!
//! The coordinator holds `Arc`s to both but never owns their lifecycle.

use crate::error::XaError;
use crate::types::{EndFlag, StartFlags, Status, TransactionId, Vote};

/// XA participant capability.
///
/// Methods take `&self`; implementations use interior mutability. The
/// coordinator calls them while holding its own lock, so an implementation
/// must not call back into the coordinator that is driving it (reading
/// [`Status`] through the transaction handle is fine).
pub trait Participant: Send + Sync {
    /// Set the branch timeout in seconds
    fn set_transaction_timeout(&self, seconds: u32) -> Result<(), XaError>;

    /// Associate the branch with the transaction
    fn start(&self, xid: &TransactionId, flags: StartFlags) -> Result<(), XaError>;

    /// Dissociate the branch from the transaction
    fn end(&self, xid: &TransactionId, flag: EndFlag) -> Result<(), XaError>;

    /// First phase: vote on the outcome
    fn prepare(&self, xid: &TransactionId) -> Result<Vote, XaError>;

    /// Second phase: make the branch's work durable
    fn commit(&self, xid: &TransactionId, one_phase: bool) -> Result<(), XaError>;

    /// Undo the branch's work
    fn rollback(&self, xid: &TransactionId) -> Result<(), XaError>;
}

/// Completion callbacks (JTA "synchronization").
///
/// Errors are logged by the coordinator and never abort completion.
pub trait CompletionListener: Send + Sync {
    /// Called before the prepare phase of a commit. Not called on rollback.
    fn before_completion(&self) -> anyhow::Result<()>;

    /// Called exactly once with the final status
    fn after_completion(&self, status: Status) -> anyhow::Result<()>;
}
