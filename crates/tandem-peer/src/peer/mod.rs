//! Composed peers.
//!
//! [`RoleComposer`] checks a user's handlers and hooks against a role and an
//! API schema and produces a [`ComposedPeer`]. The role-specific runtimes
//! ([`Server`], [`Client`], [`Gateway`], [`Browser`]) are built from a
//! composed peer and never from raw handlers, so every live connection has
//! passed the same composition checks.

mod browser;
mod builtins;
mod client;
mod connection;
mod gateway;
mod roster;
mod server;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tandem_core::api::ApiSchema;
use tandem_core::protocol::first_stage;
use tandem_core::role::{CapabilitySet, Role};
use tandem_core::{Result, RpcError};

use crate::dispatch::HandlerSet;
use crate::proxy::RemoteProxy;

pub use browser::Browser;
pub use client::Client;
pub use connection::{ConnId, Connection};
pub use gateway::Gateway;
pub use roster::Roster;
pub use server::Server;

/// Lifecycle hooks of a composed peer. All default to no-ops.
///
/// Hooks are never reachable from the remote: their names are part of every
/// role's protected set.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// A connection is open. `remote` calls the other side.
    async fn on_connect(&self, _id: ConnId, _remote: &RemoteProxy) {}

    async fn on_disconnect(&self, _id: ConnId) {}

    /// Gateway only: the server asked this gateway to quit.
    async fn on_quit(&self) {}

    /// Final cleanup once the peer is done for good.
    async fn teardown(&self) {}
}

/// Peer without lifecycle hooks.
pub struct NoHooks;

impl Lifecycle for NoHooks {}

/// Builder that turns handlers + hooks into a [`ComposedPeer`] for a role.
pub struct RoleComposer {
    role: Role,
    schema: ApiSchema,
    hooks: Arc<dyn Lifecycle>,
    handlers: HandlerSet,
    protected: Vec<String>,
}

impl RoleComposer {
    pub fn new(role: Role, schema: ApiSchema) -> Self {
        Self {
            role,
            schema,
            hooks: Arc::new(NoHooks),
            handlers: HandlerSet::new(),
            protected: Vec::new(),
        }
    }

    pub fn hooks(mut self, hooks: impl Lifecycle) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    /// Extra top-level names the remote must never reach.
    pub fn protect<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn compose(self) -> Result<ComposedPeer> {
        let Self {
            role,
            schema,
            hooks,
            handlers,
            protected,
        } = self;

        schema.validate()?;
        if !handlers.errors().is_empty() {
            return Err(RpcError::Config(handlers.errors().join("; ")));
        }

        let own = role.own_names();
        for path in handlers.paths() {
            let stage = first_stage(&path);
            if own.contains(stage) || protected.iter().any(|p| p == stage) {
                return Err(RpcError::Config(format!(
                    "handler {path} is shadowed by protected member {stage}"
                )));
            }
        }

        if let Some(side) = role.local_side() {
            let missing: Vec<String> = schema
                .paths(side)
                .into_iter()
                .filter(|p| !handlers.contains(p))
                .collect();
            if !missing.is_empty() {
                return Err(RpcError::Config(format!(
                    "{role} peer has no handler for: {}",
                    missing.join(", ")
                )));
            }
            if !schema.is_empty() {
                for path in handlers.paths() {
                    if !schema.declares(side, &path) {
                        warn!(%role, %path, "handler is not declared in the api schema");
                    }
                }
            }
        }

        let capabilities = CapabilitySet::for_role(role).protect(protected);
        debug!(%role, handlers = handlers.paths().len(), "peer composed");

        Ok(ComposedPeer {
            role,
            schema: Arc::new(schema),
            hooks,
            handlers: Arc::new(handlers),
            capabilities: Arc::new(capabilities),
        })
    }
}

/// Validated handlers, hooks, schema and capability set for one role.
#[derive(Clone)]
pub struct ComposedPeer {
    role: Role,
    schema: Arc<ApiSchema>,
    hooks: Arc<dyn Lifecycle>,
    handlers: Arc<HandlerSet>,
    capabilities: Arc<CapabilitySet>,
}

impl ComposedPeer {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn schema(&self) -> &Arc<ApiSchema> {
        &self.schema
    }

    pub fn hooks(&self) -> &Arc<dyn Lifecycle> {
        &self.hooks
    }

    pub fn handlers(&self) -> &Arc<HandlerSet> {
        &self.handlers
    }

    pub fn capabilities(&self) -> &Arc<CapabilitySet> {
        &self.capabilities
    }

    pub(crate) fn expect_role(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(RpcError::Config(format!(
                "peer composed as {} cannot run as {role}",
                self.role
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tandem_core::api::Side;

    use crate::dispatch::Call;

    async fn ok(_call: Call) -> Result<Value> {
        Ok(json!(true))
    }

    fn schema() -> ApiSchema {
        ApiSchema::new()
            .declare("user", Side::Server, ["login"])
            .declare("ui", Side::Client, ["notify"])
    }

    #[test]
    fn server_must_implement_every_declared_method() {
        let err = RoleComposer::new(Role::Server, schema()).compose().err().unwrap();
        assert!(err.to_string().contains("user:login"));

        let peer = RoleComposer::new(Role::Server, schema())
            .handlers(HandlerSet::new().method("user:login", ok))
            .compose()
            .unwrap();
        assert!(peer.capabilities().is_disallowed("shutdown"));
    }

    #[test]
    fn browser_needs_no_handlers() {
        assert!(RoleComposer::new(Role::Browser, schema()).compose().is_ok());
    }

    #[test]
    fn handlers_under_own_names_are_refused() {
        let err = RoleComposer::new(Role::Client, ApiSchema::new())
            .handlers(HandlerSet::new().method("state:get", ok))
            .compose()
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Config(_)));
    }

    #[test]
    fn protected_names_extend_the_capability_set() {
        let peer = RoleComposer::new(Role::Client, ApiSchema::new())
            .protect(["secrets"])
            .compose()
            .unwrap();
        assert!(peer.capabilities().check("secrets:dump").is_err());
        assert!(peer.capabilities().check("disconnect").is_ok());
    }

    #[test]
    fn role_mismatch_is_a_config_error() {
        let peer = RoleComposer::new(Role::Browser, ApiSchema::new()).compose().unwrap();
        assert!(peer.expect_role(Role::Server).is_err());
    }
}
