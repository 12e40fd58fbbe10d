//! Inbound frame routing for one connection.
//!
//! Every text frame goes through [`CallRouter::route`]:
//! - responses resolve pending calls on the transport adapter
//! - sync frames are handed to the connection's replica, if it has one
//! - calls are checked against the capability set, resolved against the
//!   built-ins and the handler tree, and run on their own task
//!
//! Exactly one response is sent per call, including rejected, unresolved
//! and panicking ones. Handlers run concurrently, but responses to calls of
//! the same name leave in the order the calls arrived: the caller matches
//! them to its waiters by name, oldest first.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn, Instrument};

use tandem_core::protocol::{CallFrame, Envelope, Frame, SyncFrame, SEPARATOR};
use tandem_core::role::{CapabilitySet, Role};
use tandem_core::{Result, RpcError};

use super::handlers::{Call, Handler, HandlerSet};
use crate::proxy::RemoteProxy;
use crate::transport::adapter::Reply;
use crate::transport::TransportAdapter;

/// What the connection loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Continue,
    Close,
}

/// Built-in handlers keyed by their bare (un-namespaced) name.
pub type Builtins = BTreeMap<&'static str, Arc<dyn Handler>>;

/// Call target lookup: bare names hit the built-ins, namespaced names the
/// user's handler tree.
#[derive(Clone)]
pub struct Receiver {
    handlers: Arc<HandlerSet>,
    builtins: Builtins,
}

impl Receiver {
    pub fn new(handlers: Arc<HandlerSet>, builtins: Builtins) -> Self {
        Self { handlers, builtins }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>> {
        if !name.contains(SEPARATOR) {
            return self
                .builtins
                .get(name)
                .cloned()
                .ok_or_else(|| RpcError::Unresolved(name.to_string()));
        }
        self.handlers.resolve(name)
    }
}

pub struct CallRouter {
    role: Role,
    capabilities: Arc<CapabilitySet>,
    receiver: Receiver,
    adapter: Arc<TransportAdapter>,
    proxy: RemoteProxy,
    sync_tx: Option<mpsc::UnboundedSender<SyncFrame>>,
    // per call name: fires once the latest dispatched call has replied
    reply_turns: DashMap<String, oneshot::Receiver<()>>,
}

impl CallRouter {
    pub fn new(
        role: Role,
        capabilities: Arc<CapabilitySet>,
        receiver: Receiver,
        proxy: RemoteProxy,
        sync_tx: Option<mpsc::UnboundedSender<SyncFrame>>,
    ) -> Self {
        Self {
            role,
            capabilities,
            receiver,
            adapter: Arc::clone(proxy.adapter()),
            proxy,
            sync_tx,
            reply_turns: DashMap::new(),
        }
    }

    pub fn adapter(&self) -> &Arc<TransportAdapter> {
        &self.adapter
    }

    pub fn proxy(&self) -> &RemoteProxy {
        &self.proxy
    }

    pub fn route(&self, text: &str) -> Routed {
        let envelope = match Envelope::parse(text) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                return Routed::Continue;
            }
        };
        let call_name = envelope.call_name().map(str::to_owned);

        match envelope.classify() {
            Ok(Frame::Call(call)) => {
                self.dispatch(call);
                Routed::Continue
            }
            Ok(Frame::Response(response)) => {
                if let Err(e) = self.adapter.resolve(&response.name, response.outcome) {
                    error!(error = %e, name = %response.name, "unmatched response");
                }
                Routed::Continue
            }
            Ok(Frame::Sync(frame)) => {
                match &self.sync_tx {
                    Some(tx) => {
                        if tx.send(frame).is_err() {
                            warn!("replica gone, sync frame dropped");
                        }
                    }
                    None => error!(role = %self.role, "sync frame on a connection without a replica"),
                }
                Routed::Continue
            }
            Err(e) => {
                error!(error = %e, "protocol violation");
                match call_name {
                    // A malformed call still gets its single response before
                    // the connection is dropped.
                    Some(name) => {
                        reply(&self.adapter, &name, Err(e.to_string()));
                        Routed::Close
                    }
                    None => Routed::Continue,
                }
            }
        }
    }

    fn dispatch(&self, call: CallFrame) {
        let CallFrame { name, args } = call;

        if let Err(e) = self.capabilities.check(&name) {
            warn!(%name, role = %self.role, "rejected call to protected member");
            reply(&self.adapter, &name, Err(e.to_string()));
            return;
        }
        let handler = match self.receiver.resolve(&name) {
            Ok(h) => h,
            Err(e) => {
                debug!(%name, error = %e, "unresolved call");
                reply(&self.adapter, &name, Err(e.to_string()));
                return;
            }
        };

        let caller = self
            .role
            .receives_caller_proxy()
            .then(|| self.proxy.clone());
        let adapter = Arc::clone(&self.adapter);
        let (turn_done, turn) = oneshot::channel();
        let previous_turn = self.reply_turns.insert(name.clone(), turn);

        tokio::spawn(
            async move {
                let call = Call::new(name.clone(), args, caller);
                let outcome = match AssertUnwindSafe(handler.call(call)).catch_unwind().await {
                    Ok(Ok(Value::Null)) => Ok(Value::Bool(true)),
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => {
                        error!(%name, "handler panicked");
                        Err(format!("handler for {name} panicked"))
                    }
                };
                if let Some(previous) = previous_turn {
                    // a dropped sender means that task is gone; go ahead
                    let _ = previous.await;
                }
                reply(&adapter, &name, outcome);
                let _ = turn_done.send(());
                handler.after_reply().await;
            }
            .in_current_span(),
        );
    }
}

fn reply(adapter: &TransportAdapter, call_name: &str, outcome: Reply) {
    if let Err(e) = adapter.emit(&Envelope::response(call_name, &outcome)) {
        debug!(name = call_name, error = %e, "response not delivered");
    }
}
