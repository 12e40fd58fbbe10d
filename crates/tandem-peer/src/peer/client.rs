use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{error, info, warn};

use tandem_core::role::{builtin, Role};
use tandem_core::sync::{Snapshot, StateSyncEngine};
use tandem_core::Result;

use super::builtins::{Quit, SyncState};
use super::connection::{ConnId, Connection, ConnectionOptions};
use super::gateway::relay_handlers;
use super::ComposedPeer;
use crate::config::ClientSection;
use crate::dispatch::{Builtins, HandlerSet};
use crate::lock;
use crate::proxy::RemoteProxy;
use crate::transport::{connect, Link};

/// Client role runtime: one connection to a server.
///
/// Calls made before the link is up are queued and flushed once it opens.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

/// Shared by [`Client`] and [`crate::Gateway`]. A plain client simply never
/// attaches a browser.
pub(crate) struct ClientInner {
    peer: ComposedPeer,
    call_timeout: Duration,
    conn: Arc<Connection>,
    // lock order: engine, then browser
    engine: Mutex<StateSyncEngine>,
    browser: Mutex<Option<Arc<Connection>>>,
    browser_handlers: Arc<HandlerSet>,
    next_browser_id: AtomicU64,
    closed: watch::Sender<bool>,
}

impl Client {
    /// Run a client over an already established link.
    pub fn over(peer: ComposedPeer, link: Link, call_timeout: Duration) -> Result<Self> {
        peer.expect_role(Role::Client)?;
        let client = Self::build(peer, call_timeout);
        client.start(async move { Ok(link) });
        Ok(client)
    }

    /// Dial `cfg.url` in the background.
    pub fn connect(peer: ComposedPeer, cfg: &ClientSection) -> Result<Self> {
        peer.expect_role(Role::Client)?;
        let client = Self::build(peer, cfg.call_timeout());
        let url = cfg.url.clone();
        client.start(async move { connect::dial(&url).await });
        Ok(client)
    }

    pub(crate) fn build(peer: ComposedPeer, call_timeout: Duration) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let mut builtins = Builtins::new();
            if peer.role() == Role::Gateway {
                builtins.insert(builtin::SYNC_STATE, Arc::new(SyncState::new(weak.clone())));
                builtins.insert(builtin::QUIT, Arc::new(Quit::new(weak.clone())));
            }
            let conn = Connection::new(ConnectionOptions {
                id: 0,
                role: peer.role(),
                schema: Arc::clone(peer.schema()),
                capabilities: Arc::clone(peer.capabilities()),
                handlers: Arc::clone(peer.handlers()),
                builtins,
                call_timeout,
                sync_tx: None,
            });
            let browser_handlers = if peer.role() == Role::Gateway {
                relay_handlers(&peer, conn.proxy())
            } else {
                Arc::new(HandlerSet::new())
            };
            let (closed, _) = watch::channel(false);
            ClientInner {
                peer,
                call_timeout,
                conn,
                engine: Mutex::new(StateSyncEngine::new()),
                browser: Mutex::new(None),
                browser_handlers,
                next_browser_id: AtomicU64::new(0),
                closed,
            }
        });
        Self { inner }
    }

    pub(crate) fn start<F>(&self, link: F)
    where
        F: Future<Output = Result<Link>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match link.await {
                Ok(link) => inner.run(link).await,
                Err(e) => {
                    error!(error = %e, "could not open connection");
                    inner.conn.adapter().close();
                    inner.finish().await;
                }
            }
        });
    }

    /// Proxy for calling the server.
    pub fn server(&self) -> &RemoteProxy {
        self.inner.conn.proxy()
    }

    pub fn state(&self) -> Value {
        lock(&self.inner.engine).state_value()
    }

    /// Merge `update` into the state. Replicated to an attached browser.
    pub fn set_state(&self, update: Map<String, Value>) {
        self.inner.set_state(update);
    }

    pub fn is_open(&self) -> bool {
        self.inner.conn.is_open()
    }

    /// Close the server connection. Hooks run once the loop has stopped.
    pub fn disconnect(&self) {
        self.inner.conn.close();
    }

    /// Resolves once the connection is gone and hooks have run.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl ClientInner {
    async fn run(self: Arc<Self>, link: Link) {
        let hooks = Arc::clone(self.peer.hooks());
        {
            let hooks = Arc::clone(&hooks);
            let remote = self.conn.proxy().clone();
            let id = self.conn.id();
            tokio::spawn(async move { hooks.on_connect(id, &remote).await });
        }
        self.conn.run(link).await;
        self.finish().await;
    }

    async fn finish(&self) {
        if let Some(browser) = self.take_browser() {
            browser.close();
        }
        let hooks = self.peer.hooks();
        hooks.on_disconnect(self.conn.id()).await;
        hooks.teardown().await;
        self.closed.send_replace(true);
        info!(role = %self.peer.role(), "peer finished");
    }

    pub(crate) fn peer(&self) -> &ComposedPeer {
        &self.peer
    }

    pub(crate) fn set_state(&self, update: Map<String, Value>) {
        let mut engine = lock(&self.engine);
        let Some(frame) = engine.set_state(update) else {
            return;
        };
        let browser = lock(&self.browser);
        if let Some(browser) = browser.as_ref() {
            if let Err(e) = browser.emit_sync(&frame) {
                warn!(error = %e, "state diff not delivered");
            }
        }
    }

    /// Full state for `syncState`; also re-baselines the diff engine.
    pub(crate) fn sync_state(&self) -> Snapshot {
        lock(&self.engine).sync_state()
    }

    /// Push a full snapshot to the attached browser, if any.
    pub(crate) fn push_snapshot(&self) -> Result<bool> {
        let mut engine = lock(&self.engine);
        let browser = lock(&self.browser);
        let Some(browser) = browser.as_ref() else {
            return Ok(false);
        };
        browser.emit_sync(&engine.snapshot_frame())?;
        Ok(true)
    }

    pub(crate) async fn quit(&self) {
        self.peer.hooks().on_quit().await;
        if let Some(browser) = self.take_browser() {
            browser.close();
        }
        self.conn.close();
    }

    /// Make `link` the browser connection, replacing any previous one.
    /// The first frame it receives is a full snapshot.
    pub(crate) fn attach_browser(self: &Arc<Self>, link: Link) -> ConnId {
        let id = self.next_browser_id.fetch_add(1, Ordering::Relaxed);
        let mut builtins = Builtins::new();
        builtins.insert(
            builtin::SYNC_STATE,
            Arc::new(SyncState::new(Arc::downgrade(self))),
        );
        let conn = Connection::new(ConnectionOptions {
            id,
            role: Role::Gateway,
            schema: Arc::clone(self.peer.schema()),
            capabilities: Arc::clone(self.peer.capabilities()),
            handlers: Arc::clone(&self.browser_handlers),
            builtins,
            call_timeout: self.call_timeout,
            sync_tx: None,
        });

        {
            let mut engine = lock(&self.engine);
            let mut slot = lock(&self.browser);
            if let Some(old) = slot.replace(Arc::clone(&conn)) {
                warn!(old = old.id(), new = id, "replacing attached browser");
                old.close();
            }
            engine.attach();
            // queued in the adapter backlog until the link opens
            if let Err(e) = conn.emit_sync(&engine.snapshot_frame()) {
                warn!(error = %e, "initial snapshot not queued");
            }
        }
        info!(browser = id, "browser attached");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            conn.run(link).await;
            inner.detach_browser(id);
        });
        id
    }

    pub(crate) fn browser_proxy(&self) -> Option<RemoteProxy> {
        lock(&self.browser).as_ref().map(|c| c.proxy().clone())
    }

    fn detach_browser(&self, id: ConnId) {
        let mut engine = lock(&self.engine);
        let mut slot = lock(&self.browser);
        if slot.as_ref().is_some_and(|c| c.id() == id) {
            *slot = None;
            engine.detach();
            info!(browser = id, "browser detached");
        }
    }

    fn take_browser(&self) -> Option<Arc<Connection>> {
        let mut engine = lock(&self.engine);
        let taken = lock(&self.browser).take();
        if taken.is_some() {
            engine.detach();
        }
        taken
    }
}
