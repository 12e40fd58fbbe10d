use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, info_span, Instrument};

use tandem_core::api::ApiSchema;
use tandem_core::protocol::{Envelope, SyncFrame};
use tandem_core::role::{builtin, CapabilitySet, Role};
use tandem_core::Result;

use super::builtins::Disconnect;
use crate::dispatch::{Builtins, CallRouter, HandlerSet, Receiver, Routed};
use crate::proxy::RemoteProxy;
use crate::transport::{Link, TransportAdapter};

/// Connection id, unique within one server (or one gateway's browser slot).
pub type ConnId = u64;

pub(crate) struct ConnectionOptions {
    pub id: ConnId,
    pub role: Role,
    pub schema: Arc<ApiSchema>,
    pub capabilities: Arc<CapabilitySet>,
    pub handlers: Arc<HandlerSet>,
    pub builtins: Builtins,
    pub call_timeout: Duration,
    pub sync_tx: Option<mpsc::UnboundedSender<SyncFrame>>,
}

/// One live link to a remote peer: adapter, router and proxy.
pub struct Connection {
    id: ConnId,
    role: Role,
    router: CallRouter,
    shutdown: Arc<Notify>,
}

impl Connection {
    pub(crate) fn new(opts: ConnectionOptions) -> Arc<Self> {
        let adapter = Arc::new(TransportAdapter::new());
        let proxy = RemoteProxy::new(
            adapter,
            opts.schema,
            opts.role.remote_side(),
            opts.call_timeout,
        );
        let shutdown = Arc::new(Notify::new());

        let mut builtins = opts.builtins;
        if opts.role.allow_list().contains(&builtin::DISCONNECT) {
            builtins.insert(
                builtin::DISCONNECT,
                Arc::new(Disconnect::new(Arc::clone(&shutdown))),
            );
        }

        let router = CallRouter::new(
            opts.role,
            opts.capabilities,
            Receiver::new(opts.handlers, builtins),
            proxy,
            opts.sync_tx,
        );
        Arc::new(Self {
            id: opts.id,
            role: opts.role,
            router,
            shutdown,
        })
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn proxy(&self) -> &RemoteProxy {
        self.router.proxy()
    }

    pub fn adapter(&self) -> &Arc<TransportAdapter> {
        self.router.adapter()
    }

    pub fn is_open(&self) -> bool {
        self.adapter().is_open()
    }

    /// Ask the connection loop to stop. Safe to call before it has started.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    pub(crate) fn emit_sync(&self, frame: &SyncFrame) -> Result<()> {
        self.adapter().emit(&Envelope::from_sync(frame)?)
    }

    /// Drive the connection until either side closes.
    pub(crate) async fn run(&self, link: Link) {
        let span = info_span!("conn", id = self.id, role = %self.role);
        async {
            let Link {
                outbound,
                mut inbound,
            } = link;
            self.adapter().open(outbound);
            info!("connection open");

            loop {
                tokio::select! {
                    maybe_in = inbound.recv() => {
                        let Some(text) = maybe_in else {
                            debug!("remote closed");
                            break;
                        };
                        if self.router.route(&text) == Routed::Close {
                            break;
                        }
                    }
                    _ = self.shutdown.notified() => {
                        debug!("local close");
                        break;
                    }
                }
            }

            self.adapter().close();
            info!("connection closed");
        }
        .instrument(span)
        .await
    }
}
