//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/peers`   : ids of connected clients, in connection order

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::app_state::AppState;
use crate::peer::ConnId;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn peers(State(state): State<AppState>) -> Json<Vec<ConnId>> {
    Json(state.server().clients())
}
