//! In-process links, used by tests and by embedders that run both peers in
//! one process.

use tokio::sync::mpsc;

use super::Link;

/// Two cross-wired links: whatever one side sends, the other receives.
pub fn pair() -> (Link, Link) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Link {
            outbound: a_tx,
            inbound: b_rx,
        },
        Link {
            outbound: b_tx,
            inbound: a_rx,
        },
    )
}
