//! Remote proxies: call the other side of a connection by path.
//!
//! A [`RemoteProxy`] turns `ns("user").call("login", args)` into a call
//! envelope named `user:login` and awaits its response. When the proxy was
//! built with a non-empty [`ApiSchema`], namespaced calls are checked
//! against the remote side's declared methods before anything is sent.
//!
//! For typed call sites, [`remote_namespace!`](crate::remote_namespace)
//! generates a struct with one async method per remote method.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use tandem_core::api::{ApiSchema, Side};
use tandem_core::protocol::join;
use tandem_core::{Result, RpcError};

use crate::transport::TransportAdapter;

#[derive(Clone)]
pub struct RemoteProxy {
    adapter: Arc<TransportAdapter>,
    schema: Arc<ApiSchema>,
    remote: Side,
    timeout: Duration,
}

impl RemoteProxy {
    pub fn new(
        adapter: Arc<TransportAdapter>,
        schema: Arc<ApiSchema>,
        remote: Side,
        timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            schema,
            remote,
            timeout,
        }
    }

    pub fn adapter(&self) -> &Arc<TransportAdapter> {
        &self.adapter
    }

    pub fn schema(&self) -> &ApiSchema {
        &self.schema
    }

    /// Side of the schema the remote implements.
    pub fn remote_side(&self) -> Side {
        self.remote
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same connection, different per-call timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn is_open(&self) -> bool {
        self.adapter.is_open()
    }

    pub fn ns(&self, namespace: &str) -> NamespaceProxy {
        NamespaceProxy {
            proxy: self.clone(),
            namespace: namespace.to_string(),
        }
    }

    /// Call `path` verbatim. No schema check; built-ins like `syncState`
    /// go through here.
    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.adapter.send(path, args, self.timeout).await
    }

    pub async fn call_as<T: DeserializeOwned>(&self, path: &str, args: Vec<Value>) -> Result<T> {
        let value = self.call(path, args).await?;
        decode_result(path, value)
    }
}

/// A proxy scoped to one namespace of the remote.
#[derive(Clone)]
pub struct NamespaceProxy {
    proxy: RemoteProxy,
    namespace: String,
}

impl NamespaceProxy {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Nested namespace, e.g. `ns("a").ns("b")` targets `a:b:*`.
    pub fn ns(&self, child: &str) -> NamespaceProxy {
        NamespaceProxy {
            proxy: self.proxy.clone(),
            namespace: join(&self.namespace, child),
        }
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let path = join(&self.namespace, method);
        let schema = self.proxy.schema();
        if !schema.is_empty() && !schema.declares(self.proxy.remote, &path) {
            return Err(RpcError::Unresolved(format!(
                "{path}: not declared on the {} side",
                self.proxy.remote
            )));
        }
        self.proxy.call(&path, args).await
    }

    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let value = self.call(method, args).await?;
        decode_result(method, value)
    }
}

fn decode_result<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| RpcError::Protocol(format!("{path}: unexpected response payload: {e}")))
}

/// Typed wrapper over one remote namespace.
///
/// ```ignore
/// tandem_peer::remote_namespace! {
///     pub struct UserApi = "user" {
///         fn login = "login"(name: String) -> bool;
///         fn count = "count"() -> u64;
///     }
/// }
///
/// let user = UserApi::new(client.server());
/// let ok = user.login("ada".into()).await?;
/// ```
#[macro_export]
macro_rules! remote_namespace {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident = $ns:literal {
            $(
                $(#[$mmeta:meta])*
                fn $method:ident = $wire:literal ( $($arg:ident : $ty:ty),* $(,)? ) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            inner: $crate::proxy::NamespaceProxy,
        }

        impl $name {
            pub fn new(proxy: &$crate::proxy::RemoteProxy) -> Self {
                Self { inner: proxy.ns($ns) }
            }

            $(
                $(#[$mmeta])*
                pub async fn $method(&self, $($arg: $ty),*) -> $crate::Result<$ret> {
                    let args: ::std::vec::Vec<$crate::__private::serde_json::Value> =
                        ::std::vec![$($crate::__private::to_arg(&$arg)?),*];
                    self.inner.call_as($wire, args).await
                }
            )*
        }
    };
}
