use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tracing::info;

use tandem_core::role::Role;
use tandem_core::Result;

use super::connection::{ConnId, Connection, ConnectionOptions};
use super::roster::Roster;
use super::ComposedPeer;
use crate::config::ServerSection;
use crate::dispatch::Builtins;
use crate::proxy::RemoteProxy;
use crate::transport::Link;

/// Server role runtime: one connection per accepted link, tracked in a
/// [`Roster`].
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    peer: ComposedPeer,
    roster: Roster,
    call_timeout: Duration,
}

impl Server {
    pub fn new(peer: ComposedPeer, call_timeout: Duration) -> Result<Self> {
        peer.expect_role(Role::Server)?;
        Ok(Self {
            inner: Arc::new(ServerInner {
                peer,
                roster: Roster::new(),
                call_timeout,
            }),
        })
    }

    pub fn from_config(peer: ComposedPeer, cfg: &ServerSection) -> Result<Self> {
        Self::new(peer, cfg.call_timeout())
    }

    /// Start serving `link`. The connection is in the roster when this
    /// returns; `on_connect` runs concurrently with the connection loop.
    pub fn accept(&self, link: Link) -> ConnId {
        let inner = &self.inner;
        let id = inner.roster.allocate_id();
        let conn = Connection::new(ConnectionOptions {
            id,
            role: Role::Server,
            schema: Arc::clone(inner.peer.schema()),
            capabilities: Arc::clone(inner.peer.capabilities()),
            handlers: Arc::clone(inner.peer.handlers()),
            builtins: Builtins::new(),
            call_timeout: inner.call_timeout,
            sync_tx: None,
        });
        inner.roster.push(Arc::clone(&conn));
        info!(conn = id, clients = inner.roster.len(), "client connected");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let hooks = Arc::clone(inner.peer.hooks());
            {
                let hooks = Arc::clone(&hooks);
                let remote = conn.proxy().clone();
                tokio::spawn(async move { hooks.on_connect(id, &remote).await });
            }

            conn.run(link).await;

            inner.roster.remove(id);
            hooks.on_disconnect(id).await;
            info!(conn = id, clients = inner.roster.len(), "client disconnected");
        });
        id
    }

    pub fn roster(&self) -> &Roster {
        &self.inner.roster
    }

    /// Ids of connected clients, in connection order.
    pub fn clients(&self) -> Vec<ConnId> {
        self.inner.roster.ids()
    }

    pub fn client(&self, id: ConnId) -> Option<RemoteProxy> {
        self.inner.roster.get(id).map(|c| c.proxy().clone())
    }

    /// Close one client. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: ConnId) -> bool {
        match self.inner.roster.remove(id) {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Call `path` on every connected client concurrently. Results are
    /// ordered by connection id.
    pub async fn broadcast(&self, path: &str, args: Vec<Value>) -> Vec<(ConnId, Result<Value>)> {
        let mut calls: FuturesUnordered<_> = self
            .inner
            .roster
            .snapshot()
            .into_iter()
            .map(|conn| {
                let args = args.clone();
                async move {
                    let result = conn.proxy().call(path, args).await;
                    (conn.id(), result)
                }
            })
            .collect();

        let mut results = Vec::new();
        while let Some(result) = calls.next().await {
            results.push(result);
        }
        results.sort_by_key(|(id, _)| *id);
        results
    }

    /// Close every client, then run `teardown`.
    pub async fn shutdown(&self) {
        for conn in self.inner.roster.snapshot() {
            self.inner.roster.remove(conn.id());
            conn.close();
        }
        self.inner.peer.hooks().teardown().await;
        info!("server shut down");
    }
}
