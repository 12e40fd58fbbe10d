//! Top-level facade crate for tandem.
//!
//! Re-exports the runtime-free core and the peer runtime so applications
//! can depend on a single crate. `prelude` carries what a typical peer
//! definition needs.

pub mod core {
    pub use tandem_core::*;
}

pub mod peer {
    pub use tandem_peer::*;
}

pub use tandem_peer::remote_namespace;

pub mod prelude {
    pub use tandem_core::api::{ApiSchema, Side};
    pub use tandem_core::role::Role;
    pub use tandem_core::{Result, RpcError};
    pub use tandem_peer::{
        Browser, Call, Client, ComposedPeer, ConnId, Gateway, HandlerSet, Lifecycle,
        NamespaceProxy, RemoteProxy, RoleComposer, Server,
    };
}
