//! Wire protocol: JSON envelopes and call-name conventions.
//!
//! Every frame on the transport is one JSON [`Envelope`] that classifies as
//! exactly one of call, response, or state sync. Call names are namespace
//! paths joined by [`SEPARATOR`]; a response reuses the call name plus
//! [`RESPONSE_SUFFIX`].
//!
//! Decoding is panic-free: malformed input is reported as `RpcError::Protocol`.

pub mod envelope;

pub use envelope::{CallFrame, Envelope, Frame, ResponseFrame, SyncFrame};

/// Namespace separator inside call names (`user:setName`).
pub const SEPARATOR: char = ':';

/// Suffix appended to a call name to form its response name.
pub const RESPONSE_SUFFIX: &str = ":response";

/// Response name for a call name.
pub fn response_name(call: &str) -> String {
    format!("{call}{RESPONSE_SUFFIX}")
}

pub fn is_response(name: &str) -> bool {
    name.ends_with(RESPONSE_SUFFIX)
}

/// Split a call name into its path stages.
pub fn split_path(name: &str) -> impl Iterator<Item = &str> {
    name.split(SEPARATOR)
}

/// First path stage, the one checked against a peer's protected names.
pub fn first_stage(name: &str) -> &str {
    name.split(SEPARATOR).next().unwrap_or(name)
}

/// Split `a:b:method` into (`a:b`, `method`). `None` when not namespaced.
pub fn split_method(name: &str) -> Option<(&str, &str)> {
    let (ns, method) = name.rsplit_once(SEPARATOR)?;
    if ns.is_empty() || method.is_empty() {
        return None;
    }
    Some((ns, method))
}

/// Join a namespace and a method into a call name.
pub fn join(namespace: &str, method: &str) -> String {
    format!("{namespace}{SEPARATOR}{method}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_names() {
        assert_eq!(response_name("user:setName"), "user:setName:response");
        assert!(is_response("user:setName:response"));
        assert!(!is_response("user:setName"));
    }

    #[test]
    fn method_split_uses_last_separator() {
        assert_eq!(split_method("game:board:move"), Some(("game:board", "move")));
        assert_eq!(split_method("disconnect"), None);
        assert_eq!(split_method(":x"), None);
        assert_eq!(first_stage("game:board:move"), "game");
        assert_eq!(first_stage("quit"), "quit");
    }
}
