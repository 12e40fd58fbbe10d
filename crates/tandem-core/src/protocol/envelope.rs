//! Envelope (JSON text frame) and its classification.
//!
//! ```text
//! { "name": "<ns>:<method>" | "<ns>:<method>:response",
//!   "payload": [...args] | <result>,
//!   "error"?: "<message>",
//!   "state"?: <json>, "diff"?: true, "seq_num"?: <int> }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::sync::patch::PatchOp;

use super::{is_response, response_name};

/// Raw wire envelope. Use [`Envelope::classify`] to get a typed [`Frame`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Call or response name. Absent on sync frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument array (call) or result (response).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Remote failure message (response only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Patch ops (diff) or full state (snapshot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq_num: Option<u64>,
}

/// Inbound call: name plus one argument per declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub name: String,
    pub args: Vec<Value>,
}

/// Inbound response. `name` carries the response suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub name: String,
    /// `Ok(payload)` (omitted payload reads as `true`) or `Err(error)`.
    pub outcome: std::result::Result<Value, String>,
}

/// State replication frame shipped from a gateway to its browser.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncFrame {
    Diff { seq_num: u64, ops: Vec<PatchOp> },
    Snapshot { seq_num: Option<u64>, state: Value },
}

/// A classified envelope: exactly one of call, response, sync.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call(CallFrame),
    Response(ResponseFrame),
    Sync(SyncFrame),
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| RpcError::Protocol(format!("invalid envelope json: {e}")))
    }

    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RpcError::Internal(format!("envelope encode failed: {e}")))
    }

    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: Some(name.into()),
            payload: Some(Value::Array(args)),
            ..Self::default()
        }
    }

    /// Response to `call_name`. Exactly one of payload or error is set.
    pub fn response(call_name: &str, outcome: &std::result::Result<Value, String>) -> Self {
        let name = Some(response_name(call_name));
        match outcome {
            Ok(v) => Self {
                name,
                payload: Some(v.clone()),
                ..Self::default()
            },
            Err(msg) => Self {
                name,
                error: Some(msg.clone()),
                ..Self::default()
            },
        }
    }

    pub fn from_sync(frame: &SyncFrame) -> Result<Self> {
        match frame {
            SyncFrame::Diff { seq_num, ops } => {
                let state = serde_json::to_value(ops)
                    .map_err(|e| RpcError::Internal(format!("patch encode failed: {e}")))?;
                Ok(Self {
                    state: Some(state),
                    diff: Some(true),
                    seq_num: Some(*seq_num),
                    ..Self::default()
                })
            }
            SyncFrame::Snapshot { seq_num, state } => Ok(Self {
                state: Some(state.clone()),
                seq_num: *seq_num,
                ..Self::default()
            }),
        }
    }

    /// Name of the call this envelope carries, if it is shaped like a call.
    /// Available before classification so a bad call can still be answered.
    pub fn call_name(&self) -> Option<&str> {
        if self.state.is_some() {
            return None;
        }
        self.name.as_deref().filter(|n| !n.is_empty() && !is_response(n))
    }

    pub fn classify(self) -> Result<Frame> {
        if let Some(state) = self.state {
            if self.name.is_some() {
                return Err(RpcError::Protocol("sync envelope must not carry a name".into()));
            }
            if self.diff.unwrap_or(false) {
                let seq_num = self
                    .seq_num
                    .ok_or_else(|| RpcError::Protocol("diff envelope requires seq_num".into()))?;
                let ops: Vec<PatchOp> = serde_json::from_value(state)
                    .map_err(|e| RpcError::Protocol(format!("invalid patch ops: {e}")))?;
                return Ok(Frame::Sync(SyncFrame::Diff { seq_num, ops }));
            }
            return Ok(Frame::Sync(SyncFrame::Snapshot {
                seq_num: self.seq_num,
                state,
            }));
        }

        if self.diff.is_some() || self.seq_num.is_some() {
            return Err(RpcError::Protocol("sync fields present without state".into()));
        }

        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RpcError::Protocol("envelope has no name".into()))?;

        if is_response(&name) {
            let outcome = match self.error {
                Some(msg) => Err(msg),
                None => Ok(match self.payload {
                    None | Some(Value::Null) => Value::Bool(true),
                    Some(v) => v,
                }),
            };
            return Ok(Frame::Response(ResponseFrame { name, outcome }));
        }

        if self.error.is_some() {
            return Err(RpcError::Protocol(format!("call {name} carries an error field")));
        }
        match self.payload {
            Some(Value::Array(args)) => Ok(Frame::Call(CallFrame { name, args })),
            _ => Err(RpcError::Protocol(format!("call {name}: payload must be an array"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_without_payload_reads_true() {
        let env = Envelope::parse(r#"{"name":"user:setName:response"}"#).unwrap();
        match env.classify().unwrap() {
            Frame::Response(r) => assert_eq!(r.outcome, Ok(json!(true))),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn error_response_omits_payload() {
        let env = Envelope::response("a:b", &Err("boom".into()));
        let text = env.to_text().unwrap();
        assert_eq!(text, r#"{"name":"a:b:response","error":"boom"}"#);
    }

    #[test]
    fn diff_round_trips_through_envelope() {
        let frame = SyncFrame::Diff {
            seq_num: 3,
            ops: vec![PatchOp::Replace {
                path: "/score".into(),
                value: json!(7),
            }],
        };
        let text = Envelope::from_sync(&frame).unwrap().to_text().unwrap();
        let back = Envelope::parse(&text).unwrap().classify().unwrap();
        assert_eq!(back, Frame::Sync(frame));
    }
}
