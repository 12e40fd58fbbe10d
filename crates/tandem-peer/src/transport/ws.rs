//! WebSocket carrier on the accepting side (axum).
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS for the server and gateway endpoints
//! - Turn the socket into a [`Link`] driven by a single pump task
//! - Lifecycle: ping interval, idle timeout, max frame size
//!
//! The pump owns the socket. Closing the link's outbound side (the
//! connection dropping its sender) sends a close frame and ends the pump;
//! the remote closing the socket ends `inbound`.

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::app_state::{AppState, GatewayState};
use crate::config::ServerSection;
use crate::transport::codec::{decode, frame_len, Inbound};
use crate::transport::{millis, Link};

/// Socket-level limits applied by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketLimits {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl SocketLimits {
    pub fn from_config(cfg: &ServerSection) -> Self {
        Self {
            ping_interval: Duration::from_millis(cfg.ping_interval_ms),
            idle_timeout: Duration::from_millis(cfg.idle_timeout_ms),
            max_frame_bytes: cfg.max_frame_bytes,
        }
    }
}

/// Upgrade handler for the server endpoint: every socket becomes a client
/// connection on the shared [`crate::Server`].
pub async fn server_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let limits = app.limits();
    ws.max_message_size(limits.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let link = attach(socket, limits);
            let id = app.server().accept(link);
            debug!(conn = id, "ws upgraded");
        })
}

/// Upgrade handler for the gateway's browser endpoint.
pub async fn browser_upgrade(State(gw): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    let limits = gw.limits();
    ws.max_message_size(limits.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let link = attach(socket, limits);
            let id = gw.gateway().attach_browser(link);
            debug!(browser = id, "browser ws upgraded");
        })
}

/// Spawn the pump for `socket` and hand back its link.
pub fn attach(socket: WebSocket, limits: SocketLimits) -> Link {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(socket, limits, out_rx, in_tx));
    Link {
        outbound: out_tx,
        inbound: in_rx,
    }
}

async fn pump(
    socket: WebSocket,
    limits: SocketLimits,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ping_tick = tokio::time::interval(limits.ping_interval);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };

                last_activity = Instant::now();

                let bytes_len = frame_len(&msg);
                if bytes_len > limits.max_frame_bytes {
                    warn!(bytes_len, max = limits.max_frame_bytes, "frame too large, closing");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }

                match decode(msg) {
                    Inbound::Text(text) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Inbound::Binary { bytes_len } => {
                        warn!(bytes_len, "binary frame ignored");
                    }
                    Inbound::Ping(payload) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Inbound::Pong => {}
                    Inbound::Close => break,
                }
            }

            // ping
            _ = ping_tick.tick() => {
                let _ = ws_tx.send(Message::Ping(Vec::new())).await;
            }

            // idle timeout
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= limits.idle_timeout {
                    warn!(idle_ms = millis(limits.idle_timeout), "idle timeout, closing");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}
