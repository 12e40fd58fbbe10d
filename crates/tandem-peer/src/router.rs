//! Axum router wiring (HTTP -> WS upgrade).
//!
//! The server endpoint lives at the configured `server.path`; a gateway
//! process exposes its browser endpoint at `gateway.path`. Both carry the
//! operational routes from [`crate::ops`].

use axum::{routing::get, Router};

use crate::app_state::{AppState, GatewayState};
use crate::{ops, transport};

pub fn build_router(state: AppState) -> Router {
    let path = state.path().to_string();
    Router::new()
        .route(&path, get(transport::ws::server_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/peers", get(ops::peers))
        .with_state(state)
}

pub fn build_gateway_router(state: GatewayState) -> Router {
    let path = state.path().to_string();
    Router::new()
        .route(&path, get(transport::ws::browser_upgrade))
        .route("/healthz", get(ops::healthz))
        .with_state(state)
}
