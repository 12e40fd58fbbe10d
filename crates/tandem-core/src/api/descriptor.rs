//! Peer descriptors: an explicit stand-in for walking a class hierarchy.
//!
//! A descriptor lists a peer type's own methods and optionally its parent.
//! [`ApiSchema::derive`] flattens both peers' chains and keeps only the
//! namespaced async methods, which is exactly what a remote peer may call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::protocol::split_method;

use super::schema::{ApiSchema, Side};

/// How a method completes. Only async methods are remotely callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Async,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub dispatch: Dispatch,
}

/// Declared shape of one peer type and its ancestors.
#[derive(Debug, Clone)]
pub struct PeerDescriptor {
    name: String,
    parent: Option<Arc<PeerDescriptor>>,
    methods: Vec<MethodDef>,
}

impl PeerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: PeerDescriptor) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    pub fn async_method(self, name: impl Into<String>) -> Self {
        self.method(name, Dispatch::Async)
    }

    pub fn sync_method(self, name: impl Into<String>) -> Self {
        self.method(name, Dispatch::Sync)
    }

    pub fn method(mut self, name: impl Into<String>, dispatch: Dispatch) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            dispatch,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own and inherited methods. The most-derived definition of a name wins.
    pub fn resolved_methods(&self) -> BTreeMap<String, Dispatch> {
        let mut out: BTreeMap<String, (Dispatch, &str)> = BTreeMap::new();
        let mut level = Some(self);
        while let Some(desc) = level {
            // within one type, a later definition replaces an earlier one
            for m in desc.methods.iter().rev() {
                match out.get(&m.name) {
                    Some((_, owner)) => {
                        debug!(
                            method = %m.name,
                            shadowed = %desc.name,
                            winner = %owner,
                            "method collision, keeping most-derived definition"
                        );
                    }
                    None => {
                        out.insert(m.name.clone(), (m.dispatch, desc.name.as_str()));
                    }
                }
            }
            level = desc.parent.as_deref();
        }
        out.into_iter().map(|(k, (d, _))| (k, d)).collect()
    }

    /// Remotely callable paths: namespaced and async. Everything else is
    /// silently left out.
    pub fn remote_paths(&self) -> BTreeSet<String> {
        self.resolved_methods()
            .into_iter()
            .filter(|(name, dispatch)| {
                *dispatch == Dispatch::Async && split_method(name).is_some()
            })
            .map(|(name, _)| name)
            .collect()
    }
}

impl ApiSchema {
    /// Derive the schema from a client and a server descriptor.
    pub fn derive(client: &PeerDescriptor, server: &PeerDescriptor) -> ApiSchema {
        let mut schema = ApiSchema::new();
        for (side, desc) in [(Side::Client, client), (Side::Server, server)] {
            for path in desc.remote_paths() {
                if let Some((ns, method)) = split_method(&path) {
                    schema = schema.declare(ns, side, [method]);
                }
            }
        }
        schema
    }
}
