//! Health check handler.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    let ws_connections = st.ws_connection_count.load(Ordering::Relaxed);
    let json = serde_json::json!({
        "status": "ok",
        "ws_connections": ws_connections,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
