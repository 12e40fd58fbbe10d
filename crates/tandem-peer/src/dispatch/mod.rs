//! Dispatch module exports.
//!
//! Re-exports the handler trait, the handler tree and the call router so
//! peers and downstream consumers can depend on this module directly.

pub mod handlers;
pub mod router;

pub use handlers::{Call, FnHandler, Handler, HandlerSet};
pub use router::{Builtins, CallRouter, Receiver, Routed};
