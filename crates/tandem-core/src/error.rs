//! Shared error type across tandem crates.

use thiserror::Error;

/// Coarse error classification (stable API, used in logs and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed envelope, non-array call payload, orphaned response.
    Protocol,
    /// Call resolved to a protected or missing path.
    Access,
    /// The resolved handler failed, locally or on the remote peer.
    Handler,
    /// No response within the call window.
    Timeout,
    /// Socket closed or could not be opened.
    Transport,
    /// Invalid configuration or peer composition.
    Config,
    /// Internal invariant broken.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::Access => "ACCESS",
            ErrorKind::Handler => "HANDLER",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Unified error type used by core and peer crates.
///
/// Remote failures travel as plain strings: the callee renders its error with
/// `Display`, the caller gets it back as [`RpcError::Remote`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("Illegal call: {0} is a protected property")]
    IllegalCall(String),
    #[error("cannot resolve {0}")]
    Unresolved(String),
    #[error("{0}")]
    Handler(String),
    #[error("{0}")]
    Remote(String),
    #[error("call {name} timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },
    #[error("connection closed")]
    Closed,
    #[error("transport: {0}")]
    Transport(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl RpcError {
    /// Wrap any displayable failure as a handler error.
    pub fn handler(msg: impl std::fmt::Display) -> Self {
        RpcError::Handler(msg.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Protocol(_) => ErrorKind::Protocol,
            RpcError::IllegalCall(_) | RpcError::Unresolved(_) => ErrorKind::Access,
            RpcError::Handler(_) | RpcError::Remote(_) => ErrorKind::Handler,
            RpcError::Timeout { .. } => ErrorKind::Timeout,
            RpcError::Closed | RpcError::Transport(_) => ErrorKind::Transport,
            RpcError::Config(_) => ErrorKind::Config,
            RpcError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}
