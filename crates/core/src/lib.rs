//! Core types for xatm
//!
//! This crate defines the vocabulary shared by the coordinator layers:
//! - TransactionId: XA transaction identifier
//! - Status: JTA transaction status
//! - Participant / CompletionListener: external capabilities
//! - TransactionError / XaError: error model

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CompletionPhase, Result, TransactionError, XaError};
pub use traits::{CompletionListener, Participant};
pub use types::{ContextId, EndFlag, StartFlags, Status, TransactionId, Vote};
