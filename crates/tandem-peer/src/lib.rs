//! tandem peer runtime.
//!
//! Wires the core envelope, schema and capability types into live
//! connections: the transport adapter that correlates calls with responses,
//! the call router, remote proxies, and the four composed roles (server,
//! client, gateway and browser). The axum router and the binary in
//! `main.rs` sit on top of this library; integration tests drive it directly
//! over in-memory links.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::sync::{Mutex, MutexGuard};

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod ops;
pub mod peer;
pub mod proxy;
pub mod router;
pub mod transport;

pub use dispatch::{Call, Handler, HandlerSet};
pub use peer::{Browser, Client, ComposedPeer, ConnId, Gateway, Lifecycle, NoHooks, RoleComposer, Server};
pub use proxy::{NamespaceProxy, RemoteProxy};
pub use tandem_core::{Result, RpcError};

/// Lock a std mutex, recovering the data if a holder panicked.
///
/// Handler panics are caught per call, so a poisoned lock only means a
/// previous holder died mid-update of plain data; the runtime keeps going.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[doc(hidden)]
pub mod __private {
    pub use serde_json;

    use serde::Serialize;
    use serde_json::Value;
    use tandem_core::{Result, RpcError};

    pub fn to_arg<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
        serde_json::to_value(value)
            .map_err(|e| RpcError::Protocol(format!("argument encode failed: {e}")))
    }
}
