//! Transaction identifier generation
//!
//! Two interchangeable strategies behind [`XidGenerator`]:
//!
//! | Strategy | Format id | Global transaction id | Branch qualifier |
//! |----------|-----------|-----------------------|------------------|
//! | [`NamedSequenceGenerator`] | `0x1ee3` | `"<unique-name>-<seq>"` (UTF-8) | `[0]` |
//! | [`CompositeGenerator`] | `0xFEED` | 16 bytes, see below | same 16 bytes |
//!
//! Composite layout (all integers little-endian):
//!
//! ```text
//! bytes  0..4   host IPv4 address (127.0.0.1 if it cannot be resolved)
//! bytes  4..8   process-wide sequence number
//! bytes  8..12  execution context discriminator
//! bytes 12..16  random
//! ```
//!
//! Both strategies draw from a process-wide monotonic sequence, so two ids
//! generated in one process never compare equal. Across processes the named
//! strategy relies on a cluster-unique name and the composite strategy on
//! distinct host addresses plus randomness.

use once_cell::sync::Lazy;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::debug;
use xatm_core::{ContextId, TransactionId};

/// Format id of named-sequence identifiers
pub const NAMED_SEQUENCE_FORMAT_ID: i32 = 0x1ee3;

/// Format id of composite identifiers
pub const COMPOSITE_FORMAT_ID: i32 = 0xFEED;

const COMPOSITE_LEN: usize = 16;
const _: () = assert!(COMPOSITE_LEN <= TransactionId::MAXGTRIDSIZE);
const LOOPBACK: [u8; 4] = [0x7F, 0x00, 0x00, 0x01];

static NAMED_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static COMPOSITE_SEQUENCE: AtomicU32 = AtomicU32::new(1);
static LOCAL_HOST_ADDRESS: Lazy<[u8; 4]> = Lazy::new(resolve_local_address);

/// Produces a new globally-unique identifier for each unit of work.
pub trait XidGenerator: Send + Sync {
    /// Generate an identifier for a transaction begun on `context`
    fn generate(&self, context: ContextId) -> TransactionId;
}

/// `"<unique-name>-<seq>"` identifiers.
///
/// The deployment must give every coordinator in the cluster a distinct name.
#[derive(Debug, Clone)]
pub struct NamedSequenceGenerator {
    unique_name: String,
}

impl NamedSequenceGenerator {
    /// Maximum name length so that the name, separator and a full `u64`
    /// sequence fit the XA global transaction id limit.
    pub const MAX_NAME_LEN: usize = TransactionId::MAXGTRIDSIZE - 21;

    /// Create a generator for the given cluster-unique name
    ///
    /// Returns `None` if the name is empty or too long.
    pub fn new(unique_name: impl Into<String>) -> Option<Self> {
        let unique_name = unique_name.into();
        if unique_name.is_empty() || unique_name.len() > Self::MAX_NAME_LEN {
            return None;
        }
        Some(Self { unique_name })
    }

    /// The configured name
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }
}

impl XidGenerator for NamedSequenceGenerator {
    fn generate(&self, _context: ContextId) -> TransactionId {
        let sequence = NAMED_SEQUENCE.fetch_add(1, Ordering::SeqCst);
        let gtrid = format!("{}-{}", self.unique_name, sequence);
        debug_assert!(gtrid.len() <= TransactionId::MAXGTRIDSIZE);
        TransactionId::clamped(NAMED_SEQUENCE_FORMAT_ID, gtrid.as_bytes(), &[0])
    }
}

/// Host + sequence + context + random identifiers.
#[derive(Debug, Clone)]
pub struct CompositeGenerator {
    host: [u8; 4],
}

impl CompositeGenerator {
    /// Create a generator using the local host address
    pub fn new() -> Self {
        Self {
            host: *LOCAL_HOST_ADDRESS,
        }
    }

    /// Create a generator with an explicit host discriminator
    pub fn with_host_address(host: Ipv4Addr) -> Self {
        Self {
            host: host.octets(),
        }
    }

    /// Host discriminator written into every identifier
    pub fn host_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.host)
    }

    fn layout(&self, sequence: u32, context: u32, random: u32) -> [u8; COMPOSITE_LEN] {
        let mut bytes = [0u8; COMPOSITE_LEN];
        bytes[0..4].copy_from_slice(&self.host);
        bytes[4..8].copy_from_slice(&sequence.to_le_bytes());
        bytes[8..12].copy_from_slice(&context.to_le_bytes());
        bytes[12..16].copy_from_slice(&random.to_le_bytes());
        bytes
    }
}

impl Default for CompositeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl XidGenerator for CompositeGenerator {
    fn generate(&self, context: ContextId) -> TransactionId {
        let sequence = COMPOSITE_SEQUENCE.fetch_add(1, Ordering::SeqCst);
        let bytes = self.layout(sequence, context.discriminator(), rand::random::<u32>());
        TransactionId::clamped(COMPOSITE_FORMAT_ID, &bytes, &bytes)
    }
}

/// Outbound IPv4 address of this host.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
fn resolve_local_address() -> [u8; 4] {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(IpAddr::V4(addr)) if !addr.is_unspecified() => addr.octets(),
        Ok(addr) => {
            debug!(%addr, "No usable IPv4 host address; using loopback");
            LOOPBACK
        }
        Err(e) => {
            debug!(error = %e, "Could not resolve host address; using loopback");
            LOOPBACK
        }
    }
}
