//! Core types for the transaction coordinator
//!
//! This module defines the fundamental types used throughout the system:
//! - [`TransactionId`]: XA transaction identifier (Xid)
//! - [`ContextId`]: Explicit execution context a transaction is bound to
//! - [`Status`]: Transaction status with JTA numeric codes
//! - [`Vote`], [`StartFlags`], [`EndFlag`]: XA participant call vocabulary

use crate::error::{Result, TransactionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// XA flags and return codes (X/Open XA)
// ============================================================================

/// No flags set.
pub const XA_TMNOFLAGS: i32 = 0x0000_0000;
/// Caller is joining an existing transaction branch.
pub const XA_TMJOIN: i32 = 0x0020_0000;
/// Caller is resuming association with a suspended branch.
pub const XA_TMRESUME: i32 = 0x0800_0000;
/// Dissociate caller from the branch, work succeeded.
pub const XA_TMSUCCESS: i32 = 0x0400_0000;
/// Dissociate caller from the branch, work failed.
pub const XA_TMFAIL: i32 = 0x2000_0000;

/// Prepare vote: branch is prepared and must be committed or rolled back.
pub const XA_OK: i32 = 0;
/// Prepare vote: branch was read-only and is already complete.
pub const XA_RDONLY: i32 = 3;

// ============================================================================
// Transaction Identifier (Xid)
// ============================================================================

/// XA transaction identifier.
///
/// Equality and hashing are structural over all three components.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTransactionId")]
pub struct TransactionId {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

/// Unvalidated wire form; deserialization goes through [`TransactionId::new`].
#[derive(Deserialize)]
struct RawTransactionId {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl TryFrom<RawTransactionId> for TransactionId {
    type Error = TransactionError;

    fn try_from(raw: RawTransactionId) -> Result<Self> {
        TransactionId::new(
            raw.format_id,
            &raw.global_transaction_id,
            &raw.branch_qualifier,
        )
    }
}

impl TransactionId {
    /// Maximum length of the global transaction id.
    pub const MAXGTRIDSIZE: usize = 64;
    /// Maximum length of the branch qualifier.
    pub const MAXBQUALSIZE: usize = 64;

    /// Create a transaction identifier
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidXid`] if either byte component
    /// exceeds its XA size limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use xatm_core::TransactionId;
    ///
    /// let xid = TransactionId::new(0x1ee3, b"node-1-7", &[0]).unwrap();
    /// assert_eq!(xid.format_id(), 0x1ee3);
    /// assert_eq!(xid.global_transaction_id(), b"node-1-7");
    /// ```
    pub fn new(
        format_id: i32,
        global_transaction_id: &[u8],
        branch_qualifier: &[u8],
    ) -> Result<Self> {
        if global_transaction_id.len() > Self::MAXGTRIDSIZE {
            return Err(TransactionError::InvalidXid(format!(
                "global transaction id is {} bytes, maximum is {}",
                global_transaction_id.len(),
                Self::MAXGTRIDSIZE
            )));
        }
        if branch_qualifier.len() > Self::MAXBQUALSIZE {
            return Err(TransactionError::InvalidXid(format!(
                "branch qualifier is {} bytes, maximum is {}",
                branch_qualifier.len(),
                Self::MAXBQUALSIZE
            )));
        }
        Ok(Self {
            format_id,
            global_transaction_id: global_transaction_id.to_vec(),
            branch_qualifier: branch_qualifier.to_vec(),
        })
    }

    /// Create a transaction identifier, cutting each byte component to its
    /// XA size limit
    ///
    /// For generators whose layouts are bounded by construction.
    pub fn clamped(format_id: i32, global_transaction_id: &[u8], branch_qualifier: &[u8]) -> Self {
        let gtrid_len = global_transaction_id.len().min(Self::MAXGTRIDSIZE);
        let bqual_len = branch_qualifier.len().min(Self::MAXBQUALSIZE);
        Self {
            format_id,
            global_transaction_id: global_transaction_id[..gtrid_len].to_vec(),
            branch_qualifier: branch_qualifier[..bqual_len].to_vec(),
        }
    }

    /// Format discriminator
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Global transaction id bytes
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    /// Branch qualifier bytes
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "formatId={} globalTransactionId({})={{0x",
            self.format_id,
            self.global_transaction_id.len()
        )?;
        write_hex(f, &self.global_transaction_id)?;
        write!(f, "}} branchQualifier({})={{0x", self.branch_qualifier.len())?;
        write_hex(f, &self.branch_qualifier)?;
        write!(f, "}}")
    }
}

// ============================================================================
// Execution Context
// ============================================================================

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the execution context a transaction is bound to.
///
/// Transactions are bound to an explicit context value rather than to the
/// calling thread, so a task that migrates between threads keeps its
/// transaction. Contexts are cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a new process-unique context id
    ///
    /// # Examples
    ///
    /// ```
    /// use xatm_core::ContextId;
    ///
    /// let a = ContextId::new();
    /// let b = ContextId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a caller-chosen value (request id, task id, ...)
    pub fn from_raw(raw: u64) -> Self {
        ContextId(raw)
    }

    /// Raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// 32-bit discriminator used when packing the context into an Xid
    pub fn discriminator(&self) -> u32 {
        self.0 as u32
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Transaction status.
///
/// Discriminants are the JTA status codes. A coordinator only ever holds
/// the states between `Active` and the terminals `Committed` / `RolledBack`;
/// `NoTransaction` is reported by the registry when nothing is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    /// Work is in progress, participants may still be enlisted
    Active = 0,
    /// Doomed; the only remaining outcome is rollback
    MarkedRollback = 1,
    /// Every participant voted in the prepare phase
    Prepared = 2,
    /// Commit phase finished
    Committed = 3,
    /// Rollback finished
    RolledBack = 4,
    /// Status cannot be determined
    Unknown = 5,
    /// No transaction bound to the context
    NoTransaction = 6,
    /// Prepare phase running
    Preparing = 7,
    /// Commit phase running
    Committing = 8,
    /// Rollback running
    RollingBack = 9,
}

impl Status {
    /// JTA numeric status code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Decode a JTA status code
    pub fn from_code(code: u8) -> Option<Status> {
        Some(match code {
            0 => Status::Active,
            1 => Status::MarkedRollback,
            2 => Status::Prepared,
            3 => Status::Committed,
            4 => Status::RolledBack,
            5 => Status::Unknown,
            6 => Status::NoTransaction,
            7 => Status::Preparing,
            8 => Status::Committing,
            9 => Status::RollingBack,
            _ => return None,
        })
    }

    /// Committed or rolled back
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Committed | Status::RolledBack)
    }

    /// Active or marked rollback; the states rollback is accepted from
    pub fn can_rollback(&self) -> bool {
        matches!(self, Status::Active | Status::MarkedRollback)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Active => "ACTIVE",
            Status::MarkedRollback => "MARKED_ROLLBACK",
            Status::Prepared => "PREPARED",
            Status::Committed => "COMMITTED",
            Status::RolledBack => "ROLLEDBACK",
            Status::Unknown => "UNKNOWN",
            Status::NoTransaction => "NO_TRANSACTION",
            Status::Preparing => "PREPARING",
            Status::Committing => "COMMITTING",
            Status::RollingBack => "ROLLING_BACK",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Participant call vocabulary
// ============================================================================

/// Outcome of a participant's prepare call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Prepared; needs a commit or rollback call
    Ok,
    /// Read-only; nothing left to do for this branch
    ReadOnly,
    /// Any other return value. Treated as a prepare failure.
    Unknown(i32),
}

impl Vote {
    /// Map an XA return code to a vote
    pub fn from_code(code: i32) -> Self {
        match code {
            XA_OK => Vote::Ok,
            XA_RDONLY => Vote::ReadOnly,
            other => Vote::Unknown(other),
        }
    }

    /// XA return code
    pub fn code(&self) -> i32 {
        match self {
            Vote::Ok => XA_OK,
            Vote::ReadOnly => XA_RDONLY,
            Vote::Unknown(code) => *code,
        }
    }
}

/// Flags passed to a participant's start call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFlags {
    /// New branch association
    NoFlags,
    /// Join an existing branch
    Join,
    /// Resume a suspended association
    Resume,
}

impl StartFlags {
    /// XA flag value
    pub fn code(&self) -> i32 {
        match self {
            StartFlags::NoFlags => XA_TMNOFLAGS,
            StartFlags::Join => XA_TMJOIN,
            StartFlags::Resume => XA_TMRESUME,
        }
    }
}

/// Flag passed to a participant's end call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFlag {
    /// Work on the branch completed successfully
    Success,
    /// Work on the branch failed; the branch will be rolled back
    Fail,
}

impl EndFlag {
    /// XA flag value
    pub fn code(&self) -> i32 {
        match self {
            EndFlag::Success => XA_TMSUCCESS,
            EndFlag::Fail => XA_TMFAIL,
        }
    }
}
