//! Transport layer.
//!
//! Every connection, whatever carries it, is reduced to a [`Link`]: a pair
//! of text channels. The WebSocket pumps ([`ws`] on the accepting side,
//! [`connect`] on the dialing side) and the in-memory [`memory::pair`] all
//! produce one, so the rest of the runtime never touches a socket.

pub mod adapter;
pub mod codec;
pub mod connect;
pub mod memory;
pub mod ws;

use std::time::Duration;

use tokio::sync::mpsc;

pub use adapter::TransportAdapter;

/// Both directions of one connection as text frames.
///
/// Dropping `outbound` asks the carrier to close; `inbound` yields `None`
/// once the remote side is gone.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Whole milliseconds for logs and errors, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
