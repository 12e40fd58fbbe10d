//! Peer roles and the capability set each one exposes to its remote.
//!
//! A composed peer owns a fixed set of member names (lifecycle hooks plus the
//! role's internals). Everything in that set is protected from remote calls
//! except the role's explicit allow-list. The router consults the resulting
//! [`CapabilitySet`] before resolving any inbound call; there is no other
//! access-control layer.

use std::collections::BTreeSet;
use std::fmt;

use crate::api::Side;
use crate::error::{Result, RpcError};
use crate::protocol::first_stage;

/// Lifecycle hooks every composed peer carries.
pub const LIFECYCLE_HOOKS: &[&str] = &["onConnect", "onDisconnect", "onQuit", "teardown"];

/// Built-in members a remote may be allowed to call.
pub mod builtin {
    pub const DISCONNECT: &str = "disconnect";
    pub const QUIT: &str = "quit";
    pub const SYNC_STATE: &str = "syncState";
}

const CLIENT_MEMBERS: &[&str] = &["disconnect", "server", "state", "setState"];
const GATEWAY_MEMBERS: &[&str] = &["quit", "syncState", "browser", "pushSnapshot"];
const SERVER_MEMBERS: &[&str] = &["clients", "broadcast", "shutdown", "accept"];
const BROWSER_MEMBERS: &[&str] = &["gateway", "state", "subscribe"];

/// Connection role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
    Browser,
    /// Client that also bridges to a browser and replicates state to it.
    Gateway,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
            Role::Browser => "browser",
            Role::Gateway => "gateway",
        }
    }

    /// All member names of the composed type for this role.
    pub fn own_names(self) -> BTreeSet<&'static str> {
        let mut names: BTreeSet<&'static str> = LIFECYCLE_HOOKS.iter().copied().collect();
        let role_members: &[&[&str]] = match self {
            Role::Client => &[CLIENT_MEMBERS],
            Role::Gateway => &[CLIENT_MEMBERS, GATEWAY_MEMBERS],
            Role::Server => &[SERVER_MEMBERS],
            Role::Browser => &[BROWSER_MEMBERS],
        };
        for group in role_members {
            names.extend(group.iter().copied());
        }
        names
    }

    /// Own members the remote peer is still allowed to invoke.
    pub fn allow_list(self) -> &'static [&'static str] {
        match self {
            Role::Client => &[builtin::DISCONNECT],
            Role::Gateway => &[builtin::DISCONNECT, builtin::QUIT, builtin::SYNC_STATE],
            Role::Server | Role::Browser => &[],
        }
    }

    /// Server handlers get the caller's proxy as their first argument.
    pub fn receives_caller_proxy(self) -> bool {
        matches!(self, Role::Server)
    }

    /// Side of the API schema this role must implement, if any.
    pub fn local_side(self) -> Option<Side> {
        match self {
            Role::Server => Some(Side::Server),
            Role::Client | Role::Gateway => Some(Side::Client),
            Role::Browser => None,
        }
    }

    /// Side of the API schema the remote peer implements.
    pub fn remote_side(self) -> Side {
        match self {
            Role::Server => Side::Client,
            Role::Client | Role::Gateway | Role::Browser => Side::Server,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names a remote peer may not invoke on this role.
///
/// Computed once at composition: `own_names - allow_list (+ protected extras)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    role: Role,
    disallowed: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn for_role(role: Role) -> Self {
        let allowed = role.allow_list();
        let disallowed = role
            .own_names()
            .into_iter()
            .filter(|n| !allowed.contains(n))
            .map(str::to_string)
            .collect();
        Self { role, disallowed }
    }

    /// Protect additional member names of the user's peer type.
    pub fn protect<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_disallowed(&self, stage: &str) -> bool {
        self.disallowed.contains(stage)
    }

    pub fn disallowed(&self) -> impl Iterator<Item = &str> {
        self.disallowed.iter().map(String::as_str)
    }

    /// Reject `name` if its first path stage is protected.
    pub fn check(&self, name: &str) -> Result<()> {
        let stage = first_stage(name);
        if self.is_disallowed(stage) {
            return Err(RpcError::IllegalCall(stage.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_may_only_be_disconnected() {
        let caps = CapabilitySet::for_role(Role::Client);
        assert!(caps.check("disconnect").is_ok());
        assert!(caps.check("setState").is_err());
        assert!(caps.check("onConnect").is_err());
        assert!(caps.check("quit").is_ok(), "quit is not a client member");
    }

    #[test]
    fn gateway_allows_quit_and_sync_state() {
        let caps = CapabilitySet::for_role(Role::Gateway);
        for name in ["disconnect", "quit", "syncState"] {
            assert!(caps.check(name).is_ok(), "{name}");
        }
        assert!(caps.is_disallowed("setState"));
        assert!(caps.is_disallowed("teardown"));
    }

    #[test]
    fn server_allows_no_own_members() {
        let caps = CapabilitySet::for_role(Role::Server);
        for name in Role::Server.own_names() {
            assert!(caps.is_disallowed(name), "{name}");
        }
    }

    #[test]
    fn illegal_call_message_names_first_stage() {
        let caps = CapabilitySet::for_role(Role::Server).protect(["secrets"]);
        let err = caps.check("secrets:dump").err();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("Illegal call: secrets is a protected property")
        );
        assert!(caps.check("user:setName").is_ok());
    }
}
