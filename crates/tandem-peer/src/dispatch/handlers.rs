use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use tandem_core::protocol::{split_method, split_path, SEPARATOR};
use tandem_core::{Result, RpcError};

use crate::proxy::RemoteProxy;

/// A locally implemented remote-callable method.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, call: Call) -> Result<Value>;

    /// Runs once the response for this call has been queued.
    async fn after_reply(&self) {}
}

/// One inbound invocation as seen by a handler.
#[derive(Clone)]
pub struct Call {
    name: String,
    args: Vec<Value>,
    caller: Option<RemoteProxy>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Value>, caller: Option<RemoteProxy>) -> Self {
        Self {
            name: name.into(),
            args,
            caller,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    /// Proxy to the calling client. Only set on the server side.
    pub fn caller(&self) -> Option<&RemoteProxy> {
        self.caller.as_ref()
    }

    /// Positional argument `index`, decoded. A missing argument decodes
    /// from `null`, so `Option<T>` parameters may be omitted by the caller.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let raw = self.args.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(raw)
            .map_err(|e| RpcError::Handler(format!("{}: argument {index}: {e}", self.name)))
    }
}

/// Closure adapter for [`Handler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, call: Call) -> Result<Value> {
        (self.0)(call).await
    }
}

#[derive(Clone)]
enum Node {
    Namespace(BTreeMap<String, Node>),
    Method(Arc<dyn Handler>),
}

/// Namespaced handler tree a peer exposes to its remote.
///
/// Built with chained [`HandlerSet::method`] calls; registration mistakes
/// (bad paths, duplicates, a method shadowing a namespace) are collected and
/// reported when the peer is composed.
#[derive(Clone, Default)]
pub struct HandlerSet {
    root: BTreeMap<String, Node>,
    errors: Vec<String>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F, Fut>(self, path: &str, f: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handler(path, Arc::new(FnHandler::new(f)))
    }

    pub fn handler(mut self, path: &str, handler: Arc<dyn Handler>) -> Self {
        if let Err(e) = self.insert(path, handler) {
            self.errors.push(e.to_string());
        }
        self
    }

    pub fn insert(&mut self, path: &str, handler: Arc<dyn Handler>) -> Result<()> {
        if split_method(path).is_none() {
            return Err(RpcError::Config(format!(
                "handler path {path:?} must be namespace{SEPARATOR}method"
            )));
        }
        let stages: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = stages.split_last() else {
            return Err(RpcError::Config(format!("empty handler path {path:?}")));
        };

        let mut level = &mut self.root;
        for stage in parents {
            let node = level
                .entry((*stage).to_string())
                .or_insert_with(|| Node::Namespace(BTreeMap::new()));
            level = match node {
                Node::Namespace(children) => children,
                Node::Method(_) => {
                    return Err(RpcError::Config(format!(
                        "handler path {path}: {stage} is already a method"
                    )))
                }
            };
        }
        if level.contains_key(*last) {
            return Err(RpcError::Config(format!("duplicate handler for {path}")));
        }
        level.insert((*last).to_string(), Node::Method(handler));
        Ok(())
    }

    /// Registration errors collected by the builder methods.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Every registered method path, sorted.
    pub fn paths(&self) -> Vec<String> {
        fn walk(level: &BTreeMap<String, Node>, prefix: &str, out: &mut Vec<String>) {
            for (name, node) in level {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}{SEPARATOR}{name}")
                };
                match node {
                    Node::Method(_) => out.push(path),
                    Node::Namespace(children) => walk(children, &path, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }

    /// Walk `name` stage by stage down to a method.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>> {
        let mut level = &self.root;
        let mut stages = split_path(name).peekable();
        while let Some(stage) = stages.next() {
            let last = stages.peek().is_none();
            match level.get(stage) {
                None => {
                    return Err(RpcError::Unresolved(format!("{name}: no member {stage:?}")));
                }
                Some(Node::Method(handler)) if last => return Ok(Arc::clone(handler)),
                Some(Node::Method(_)) => {
                    return Err(RpcError::Unresolved(format!(
                        "{name}: {stage} is a method, not a namespace"
                    )));
                }
                Some(Node::Namespace(_)) if last => {
                    return Err(RpcError::Unresolved(format!(
                        "{name}: {stage} is a namespace, not a method"
                    )));
                }
                Some(Node::Namespace(children)) => level = children,
            }
        }
        Err(RpcError::Unresolved(name.to_string()))
    }
}
