//! Concurrency layer for xatm
//!
//! This crate implements the coordination side of XA two-phase commit:
//! - Transaction: the coordinator state machine and 2PC algorithm
//! - TransactionRegistry: one transaction per execution context
//! - XidGenerator: named-sequence and composite identifier strategies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod transaction;
pub mod xid;

pub use registry::{TransactionMetrics, TransactionRegistry};
pub use transaction::{Transaction, DEFAULT_TIMEOUT_SECS};
pub use xid::{
    CompositeGenerator, NamedSequenceGenerator, XidGenerator, COMPOSITE_FORMAT_ID,
    NAMED_SEQUENCE_FORMAT_ID,
};
