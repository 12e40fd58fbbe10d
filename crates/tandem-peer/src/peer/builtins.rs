//! Built-in members a remote may call: `disconnect` on clients and
//! gateways, `quit` and `syncState` on gateways.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use tandem_core::{Result, RpcError};

use super::client::ClientInner;
use crate::dispatch::{Call, Handler};

/// Replies, then closes the connection.
pub(crate) struct Disconnect {
    shutdown: Arc<Notify>,
}

impl Disconnect {
    pub(crate) fn new(shutdown: Arc<Notify>) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl Handler for Disconnect {
    async fn call(&self, _call: Call) -> Result<Value> {
        Ok(Value::Bool(true))
    }

    async fn after_reply(&self) {
        self.shutdown.notify_one();
    }
}

/// Full state plus sequence number; re-baselines the diff engine.
pub(crate) struct SyncState {
    client: Weak<ClientInner>,
}

impl SyncState {
    pub(crate) fn new(client: Weak<ClientInner>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Handler for SyncState {
    async fn call(&self, _call: Call) -> Result<Value> {
        let client = self.client.upgrade().ok_or(RpcError::Closed)?;
        let snapshot = client.sync_state();
        serde_json::to_value(snapshot)
            .map_err(|e| RpcError::Internal(format!("snapshot encode failed: {e}")))
    }
}

/// Replies, then runs `on_quit` and shuts the gateway down.
pub(crate) struct Quit {
    client: Weak<ClientInner>,
}

impl Quit {
    pub(crate) fn new(client: Weak<ClientInner>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Handler for Quit {
    async fn call(&self, _call: Call) -> Result<Value> {
        Ok(Value::Bool(true))
    }

    async fn after_reply(&self) {
        if let Some(client) = self.client.upgrade() {
            client.quit().await;
        }
    }
}
