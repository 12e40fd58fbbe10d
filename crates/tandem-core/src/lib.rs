//! tandem core: transport-agnostic RPC primitives shared by every peer role.
//!
//! This crate defines the wire envelope, the error surface, the API schema
//! that parameterizes routers and proxies, per-role capability sets, and the
//! state replication engine. It carries no runtime or socket dependencies so
//! the same types back servers, clients, gateways and headless browser peers.
//!
//! # Panic freedom
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed frames
//! and bad patches surface as `RpcError`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod api;
pub mod error;
pub mod protocol;
pub mod role;
pub mod sync;

/// Shared result type.
pub use error::{ErrorKind, Result, RpcError};
