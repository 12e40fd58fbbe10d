//! WebSocket carrier on the dialing side (tokio-tungstenite).

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, warn};

use tandem_core::{Result, RpcError};

use super::Link;

/// Dial `url` (`ws://` or `wss://`) and return the link once the handshake
/// has completed.
pub async fn dial(url: &str) -> Result<Link> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| RpcError::Transport(format!("connect {url} failed: {e}")))?;
    debug!(url, "ws connected");
    Ok(over_stream(stream))
}

/// Wrap an established WebSocket stream.
pub fn over_stream<S>(stream: WebSocketStream<S>) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(stream, out_rx, in_tx));
    Link {
        outbound: out_tx,
        inbound: in_rx,
    }
}

async fn pump<S>(
    stream: WebSocketStream<S>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
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

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                match msg {
                    Message::Text(text) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Message::Binary(b) => warn!(bytes_len = b.len(), "binary frame ignored"),
                    Message::Ping(payload) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Message::Pong(_) | Message::Frame(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }
}
