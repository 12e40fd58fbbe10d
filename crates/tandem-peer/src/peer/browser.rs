use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use tandem_core::protocol::SyncFrame;
use tandem_core::role::{builtin, Role};
use tandem_core::sync::{ApplyOutcome, Snapshot, StateReplica};
use tandem_core::{Result, RpcError};

use super::connection::{Connection, ConnectionOptions};
use super::ComposedPeer;
use crate::dispatch::Builtins;
use crate::lock;
use crate::proxy::RemoteProxy;
use crate::transport::Link;

/// Browser role runtime: talks to a gateway and keeps a replica of its
/// state.
///
/// Sync frames are applied in order. Any sequence gap, replay or failed
/// patch makes the browser pull a full snapshot with `syncState`. Every
/// state change is published on a watch channel.
#[derive(Clone)]
pub struct Browser {
    inner: Arc<BrowserInner>,
}

struct BrowserInner {
    peer: ComposedPeer,
    conn: Arc<Connection>,
    replica: Mutex<StateReplica>,
    updates: watch::Sender<Value>,
    closed: watch::Sender<bool>,
}

impl Browser {
    pub fn over(peer: ComposedPeer, link: Link, call_timeout: Duration) -> Result<Self> {
        peer.expect_role(Role::Browser)?;
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let conn = Connection::new(ConnectionOptions {
            id: 0,
            role: Role::Browser,
            schema: Arc::clone(peer.schema()),
            capabilities: Arc::clone(peer.capabilities()),
            handlers: Arc::clone(peer.handlers()),
            builtins: Builtins::new(),
            call_timeout,
            sync_tx: Some(sync_tx),
        });
        let replica = StateReplica::new();
        let (updates, _) = watch::channel(replica.state().clone());
        let (closed, _) = watch::channel(false);
        let inner = Arc::new(BrowserInner {
            peer,
            conn,
            replica: Mutex::new(replica),
            updates,
            closed,
        });

        tokio::spawn(apply_loop(Arc::downgrade(&inner), sync_rx));
        tokio::spawn(Arc::clone(&inner).run(link));
        Ok(Self { inner })
    }

    /// Proxy for calling the gateway (and, through it, the server).
    pub fn gateway(&self) -> &RemoteProxy {
        self.inner.conn.proxy()
    }

    pub fn state(&self) -> Value {
        lock(&self.inner.replica).state().clone()
    }

    /// Sequence number of the last applied sync frame.
    pub fn expected(&self) -> u64 {
        lock(&self.inner.replica).expected()
    }

    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.inner.updates.subscribe()
    }

    /// Pull a full snapshot now.
    pub async fn resync(&self) -> Result<()> {
        self.inner.resync().await
    }

    pub fn disconnect(&self) {
        self.inner.conn.close();
    }

    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl BrowserInner {
    async fn run(self: Arc<Self>, link: Link) {
        let hooks = Arc::clone(self.peer.hooks());
        {
            let hooks = Arc::clone(&hooks);
            let remote = self.conn.proxy().clone();
            let id = self.conn.id();
            tokio::spawn(async move { hooks.on_connect(id, &remote).await });
        }
        self.conn.run(link).await;
        hooks.on_disconnect(self.conn.id()).await;
        hooks.teardown().await;
        self.closed.send_replace(true);
    }

    async fn resync(&self) -> Result<()> {
        let value = self.conn.proxy().call(builtin::SYNC_STATE, Vec::new()).await?;
        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| RpcError::Protocol(format!("bad syncState payload: {e}")))?;
        let seq_num = snapshot.seq_num;
        lock(&self.replica).resync(snapshot);
        self.publish();
        info!(seq_num, "replica resynced");
        Ok(())
    }

    fn publish(&self) {
        let state = lock(&self.replica).state().clone();
        self.updates.send_replace(state);
    }
}

async fn apply_loop(inner: Weak<BrowserInner>, mut frames: mpsc::UnboundedReceiver<SyncFrame>) {
    while let Some(frame) = frames.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        let outcome = lock(&inner.replica).apply(&frame);
        match outcome {
            ApplyOutcome::Applied | ApplyOutcome::Replaced => inner.publish(),
            ApplyOutcome::ResyncRequired { wanted, received } => {
                debug!(wanted, received, "replica out of sequence");
                if let Err(e) = inner.resync().await {
                    error!(error = %e, "resync failed");
                }
            }
        }
    }
}
