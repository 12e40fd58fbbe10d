//! API surface: the namespace -> method-list map that parameterizes routers
//! and proxies.
//!
//! The map is either declared explicitly ([`ApiSchema::declare`], or the
//! `api:` section of a config file) or derived from two
//! [`PeerDescriptor`]s. Both paths produce the same [`ApiSchema`], and the
//! runtime only ever consumes the schema.

pub mod descriptor;
pub mod schema;

pub use descriptor::{Dispatch, MethodDef, PeerDescriptor};
pub use schema::{ApiSchema, NamespaceApi, Side};
