use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use tandem_core::api::Side;
use tandem_core::role::Role;
use tandem_core::Result;

use super::client::Client;
use super::connection::ConnId;
use super::ComposedPeer;
use crate::config::ClientSection;
use crate::dispatch::{Call, Handler, HandlerSet};
use crate::proxy::RemoteProxy;
use crate::transport::Link;

/// Gateway role runtime: a client of the server that also serves one
/// browser and replicates its state to it.
///
/// Server methods declared in the schema are relayed for the browser unless
/// the gateway implements the same path itself. The server may call `quit`
/// (runs `on_quit`, then closes) and `syncState`.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
}

impl Gateway {
    pub fn over(peer: ComposedPeer, link: Link, call_timeout: Duration) -> Result<Self> {
        peer.expect_role(Role::Gateway)?;
        let client = Client::build(peer, call_timeout);
        client.start(async move { Ok(link) });
        Ok(Self { client })
    }

    pub fn connect(peer: ComposedPeer, cfg: &ClientSection) -> Result<Self> {
        peer.expect_role(Role::Gateway)?;
        let client = Client::build(peer, cfg.call_timeout());
        let url = cfg.url.clone();
        client.start(async move { crate::transport::connect::dial(&url).await });
        Ok(Self { client })
    }

    pub fn server(&self) -> &RemoteProxy {
        self.client.server()
    }

    pub fn state(&self) -> Value {
        self.client.state()
    }

    /// Merge `update` into the state and ship the diff to the browser.
    pub fn set_state(&self, update: Map<String, Value>) {
        self.client.set_state(update);
    }

    /// Attach a browser link. Replaces the current browser, if any.
    pub fn attach_browser(&self, link: Link) -> ConnId {
        self.client.inner.attach_browser(link)
    }

    /// Proxy for calling the attached browser.
    pub fn browser(&self) -> Option<RemoteProxy> {
        self.client.inner.browser_proxy()
    }

    /// Send a full snapshot to the browser. `Ok(false)` if none is attached.
    pub fn push_snapshot(&self) -> Result<bool> {
        self.client.inner.push_snapshot()
    }

    /// Same as the server calling `quit`.
    pub async fn quit(&self) {
        self.client.inner.quit().await;
    }

    pub fn is_open(&self) -> bool {
        self.client.is_open()
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    pub async fn closed(&self) {
        self.client.closed().await;
    }

    pub fn peer(&self) -> &ComposedPeer {
        self.client.inner.peer()
    }
}

struct Relay {
    server: RemoteProxy,
}

#[async_trait]
impl Handler for Relay {
    async fn call(&self, call: Call) -> Result<Value> {
        let name = call.name().to_string();
        self.server.call(&name, call.into_args()).await
    }
}

/// Handlers the browser sees: the gateway's own, plus a relay to the server
/// for every declared server method the gateway does not implement.
pub(crate) fn relay_handlers(peer: &ComposedPeer, server: &RemoteProxy) -> Arc<HandlerSet> {
    let mut set = HandlerSet::clone(peer.handlers());
    let relay: Arc<dyn Handler> = Arc::new(Relay {
        server: server.clone(),
    });
    for path in peer.schema().paths(Side::Server) {
        if set.contains(&path) {
            continue;
        }
        if let Err(e) = set.insert(&path, Arc::clone(&relay)) {
            warn!(%path, error = %e, "server method not relayed");
        }
    }
    Arc::new(set)
}
