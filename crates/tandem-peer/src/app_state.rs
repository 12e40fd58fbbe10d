//! Shared state handed to the axum handlers.

use std::sync::Arc;

use crate::config::{GatewaySection, ServerSection};
use crate::peer::{Gateway, Server};
use crate::transport::ws::SocketLimits;

/// State of the server endpoint: the server runtime plus socket limits.
#[derive(Clone)]
pub struct AppState {
    server: Server,
    limits: SocketLimits,
    path: Arc<str>,
}

impl AppState {
    pub fn new(server: Server, cfg: &ServerSection) -> Self {
        Self {
            server,
            limits: SocketLimits::from_config(cfg),
            path: Arc::from(cfg.path.as_str()),
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn limits(&self) -> SocketLimits {
        self.limits
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// State of a gateway's browser endpoint.
#[derive(Clone)]
pub struct GatewayState {
    gateway: Gateway,
    limits: SocketLimits,
    path: Arc<str>,
}

impl GatewayState {
    /// Browser sockets use the same limits as the server section.
    pub fn new(gateway: Gateway, cfg: &GatewaySection, limits: &ServerSection) -> Self {
        Self {
            gateway,
            limits: SocketLimits::from_config(limits),
            path: Arc::from(cfg.path.as_str()),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn limits(&self) -> SocketLimits {
        self.limits
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
