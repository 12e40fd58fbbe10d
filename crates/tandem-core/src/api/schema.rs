use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};
use crate::protocol::{join, split_method, SEPARATOR};

/// Which peer answers a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Client => "client",
            Side::Server => "server",
        })
    }
}

/// Methods of one namespace, split by the side that implements them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceApi {
    #[serde(default)]
    pub client: BTreeSet<String>,
    #[serde(default)]
    pub server: BTreeSet<String>,
}

impl NamespaceApi {
    pub fn methods(&self, side: Side) -> &BTreeSet<String> {
        match side {
            Side::Client => &self.client,
            Side::Server => &self.server,
        }
    }

    fn methods_mut(&mut self, side: Side) -> &mut BTreeSet<String> {
        match side {
            Side::Client => &mut self.client,
            Side::Server => &mut self.server,
        }
    }
}

/// `namespace -> {client: [...], server: [...]}`.
///
/// Ordered maps keep iteration (and therefore generated routers and logs)
/// deterministic. Immutable once handed to a composed peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiSchema {
    namespaces: BTreeMap<String, NamespaceApi>,
}

impl ApiSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: declare `methods` of `namespace` as implemented by `side`.
    pub fn declare<I, S>(mut self, namespace: &str, side: Side, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.namespaces.entry(namespace.to_string()).or_default();
        entry.methods_mut(side).extend(methods.into_iter().map(Into::into));
        self
    }

    /// Declare a single full call path (`ns:method`).
    pub fn insert_path(&mut self, side: Side, path: &str) -> Result<()> {
        let (ns, method) = split_method(path)
            .ok_or_else(|| RpcError::Config(format!("method path is not namespaced: {path}")))?;
        self.namespaces
            .entry(ns.to_string())
            .or_default()
            .methods_mut(side)
            .insert(method.to_string());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn namespace(&self, namespace: &str) -> Option<&NamespaceApi> {
        self.namespaces.get(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &NamespaceApi)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn declares(&self, side: Side, path: &str) -> bool {
        let Some((ns, method)) = split_method(path) else {
            return false;
        };
        self.namespaces
            .get(ns)
            .is_some_and(|api| api.methods(side).contains(method))
    }

    /// Every full call path implemented by `side`, sorted.
    pub fn paths(&self, side: Side) -> Vec<String> {
        self.namespaces
            .iter()
            .flat_map(|(ns, api)| api.methods(side).iter().map(move |m| join(ns, m)))
            .collect()
    }

    /// Copy of this schema keeping only the methods `side` implements.
    pub fn only(&self, side: Side) -> ApiSchema {
        let mut out = ApiSchema::new();
        for (ns, api) in &self.namespaces {
            let methods = api.methods(side);
            if !methods.is_empty() {
                out = out.declare(ns, side, methods.iter().cloned());
            }
        }
        out
    }

    pub fn merge(&mut self, other: &ApiSchema) {
        for (ns, api) in &other.namespaces {
            let entry = self.namespaces.entry(ns.clone()).or_default();
            entry.client.extend(api.client.iter().cloned());
            entry.server.extend(api.server.iter().cloned());
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (ns, api) in &self.namespaces {
            if ns.is_empty() || ns.split(SEPARATOR).any(str::is_empty) {
                return Err(RpcError::Config(format!("invalid namespace: {ns:?}")));
            }
            for side in [Side::Client, Side::Server] {
                for m in api.methods(side) {
                    if m.is_empty() || m.contains(SEPARATOR) {
                        return Err(RpcError::Config(format!(
                            "invalid {side} method in namespace {ns}: {m:?}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
