//! Transport adapter: outbound queueing and call/response correlation.
//!
//! Frames written before the carrier is open are kept in a backlog and
//! flushed in order by [`TransportAdapter::open`]. A call registers a
//! one-shot waiter under `"<name>:response"` before it is sent; the first
//! matching response pops the oldest waiter (FIFO per name) and also fires
//! any persistent listeners registered with [`TransportAdapter::on`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use tandem_core::protocol::{response_name, Envelope};
use tandem_core::{Result, RpcError};

use super::millis;
use crate::lock;

/// Outcome carried by a response envelope: payload or error message.
pub type Reply = std::result::Result<Value, String>;

type Listener = Arc<dyn Fn(&Reply) + Send + Sync>;

struct Waiter {
    token: u64,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Outbound {
    sink: Option<mpsc::UnboundedSender<String>>,
    backlog: Vec<String>,
    closed: bool,
}

#[derive(Default)]
pub struct TransportAdapter {
    outbound: Mutex<Outbound>,
    waiters: DashMap<String, VecDeque<Waiter>>,
    listeners: DashMap<String, Vec<Listener>>,
    next_token: AtomicU64,
}

impl TransportAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the carrier and flush everything queued so far.
    pub fn open(&self, sink: mpsc::UnboundedSender<String>) {
        let mut guard = lock(&self.outbound);
        let out = &mut *guard;
        if out.closed {
            return;
        }
        let flushed = out.backlog.len();
        for text in out.backlog.drain(..) {
            if sink.send(text).is_err() {
                break;
            }
        }
        out.sink = Some(sink);
        debug!(flushed, "transport open");
    }

    /// Detach the carrier for good. Pending callers observe
    /// [`RpcError::Closed`].
    pub fn close(&self) {
        {
            let mut out = lock(&self.outbound);
            out.closed = true;
            out.sink = None;
            out.backlog.clear();
        }
        self.waiters.clear();
        self.listeners.clear();
    }

    pub fn is_open(&self) -> bool {
        let out = lock(&self.outbound);
        out.sink.is_some() && !out.closed
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.outbound).closed
    }

    /// Queue one text frame. Succeeds while the adapter is not closed.
    pub fn write(&self, text: String) -> Result<()> {
        let mut guard = lock(&self.outbound);
        let out = &mut *guard;
        if out.closed {
            return Err(RpcError::Closed);
        }
        if let Some(sink) = out.sink.as_ref() {
            return sink.send(text).map_err(|_| RpcError::Closed);
        }
        out.backlog.push(text);
        Ok(())
    }

    pub fn emit(&self, envelope: &Envelope) -> Result<()> {
        self.write(envelope.to_text()?)
    }

    /// Persistent listener for every response named `name`.
    pub fn on<F>(&self, name: &str, listener: F)
    where
        F: Fn(&Reply) + Send + Sync + 'static,
    {
        self.listeners
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn off(&self, name: &str) {
        self.listeners.remove(name);
    }

    /// Send a call and wait for its response.
    ///
    /// The waiter is removed when this future completes or is dropped, so a
    /// response arriving after the timeout finds nobody and is reported as
    /// orphaned instead of being delivered to a later caller.
    pub async fn send(&self, name: &str, args: Vec<Value>, timeout: Duration) -> Result<Value> {
        let response = response_name(name);
        let (tx, rx) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.waiters
            .entry(response.clone())
            .or_default()
            .push_back(Waiter { token, tx });
        let _guard = WaiterGuard {
            adapter: self,
            name: &response,
            token,
        };

        self.emit(&Envelope::call(name, args))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(msg))) => Err(RpcError::Remote(msg)),
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                let timeout_ms = millis(timeout);
                debug!(name, timeout_ms, "call timed out");
                Err(RpcError::Timeout {
                    name: name.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// Deliver a response to its oldest waiter and every listener.
    pub fn resolve(&self, name: &str, outcome: Reply) -> Result<()> {
        let listeners: Vec<Listener> = self
            .listeners
            .get(name)
            .map(|l| l.value().clone())
            .unwrap_or_default();
        let waiter = self.waiters.get_mut(name).and_then(|mut q| q.pop_front());
        self.waiters.remove_if(name, |_, q| q.is_empty());

        if listeners.is_empty() && waiter.is_none() {
            return Err(RpcError::Protocol(format!(
                "orphaned response {name}: no pending call"
            )));
        }

        for listener in &listeners {
            listener(&outcome);
        }
        if let Some(waiter) = waiter {
            if waiter.tx.send(outcome).is_err() {
                debug!(name, "caller went away before its response");
            }
        }
        Ok(())
    }

    /// Calls still waiting for a response, across all names.
    pub fn pending(&self) -> usize {
        self.waiters.iter().map(|q| q.value().len()).sum()
    }

    fn remove_waiter(&self, name: &str, token: u64) {
        if let Some(mut q) = self.waiters.get_mut(name) {
            q.retain(|w| w.token != token);
        }
        self.waiters.remove_if(name, |_, q| q.is_empty());
    }
}

struct WaiterGuard<'a> {
    adapter: &'a TransportAdapter,
    name: &'a str,
    token: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.adapter.remove_waiter(self.name, self.token);
    }
}
