//! Classification of raw WebSocket messages before they reach the router.
//!
//! Only text frames carry envelopes. Binary frames are counted and dropped;
//! ping, pong and close are surfaced for lifecycle handling in the pump.

use axum::extract::ws::Message;

#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary { bytes_len: usize },
    Ping(Vec<u8>),
    Pong,
    Close,
}

/// Payload size of a frame, checked against `max_frame_bytes` before decode.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) | Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message) -> Inbound {
    match msg {
        Message::Text(s) => Inbound::Text(s),
        Message::Binary(b) => Inbound::Binary { bytes_len: b.len() },
        Message::Ping(v) => Inbound::Ping(v),
        Message::Pong(_) => Inbound::Pong,
        Message::Close(_) => Inbound::Close,
    }
}
