//! Connection graph handlers: send, accept, reject, cancel, remove, list.
//!
//! Accept, reject and cancel are keyed by the (requester, recipient) pair
//! rather than a connections row id — the synthesized connection-request
//! notifications carry the requester's user id, and this is the lookup the
//! whole accept/reject wiring is built on.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::{SharedState, WsEvent};
use crate::server::utils::{api_error, now_secs, profile_to_json};
use crate::storage::NotificationRow;

#[derive(Deserialize)]
pub struct SendRequestPayload {
    sender_id: String,
    receiver_id: String,
}

/// POST /api/connections - Send a connection request.
///
/// Deliberately performs no duplicate or reverse-edge check before the
/// insert; two users requesting each other concurrently both land a pending
/// row (accepted current behavior).
pub async fn send_request_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SendRequestPayload>,
) -> Response {
    if req.sender_id.trim().is_empty() || req.receiver_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "sender_id and receiver_id required");
    }
    if req.sender_id == req.receiver_id {
        return api_error(
            StatusCode::BAD_REQUEST,
            "cannot send a connection request to yourself",
        );
    }

    let now = now_secs();
    let st = state.lock().await;
    match st.storage.insert_connection(&req.sender_id, &req.receiver_id, now) {
        Ok(id) => {
            let _ = st.ws_tx.send(WsEvent::ConnectionRequest {
                sender_id: req.sender_id.clone(),
                receiver_id: req.receiver_id.clone(),
            });
            crate::tlog!(
                "connection: request {} -> {}",
                crate::logging::user_id(&req.sender_id),
                crate::logging::user_id(&req.receiver_id)
            );
            let json = serde_json::json!({
                "id": id,
                "sender_id": req.sender_id,
                "receiver_id": req.receiver_id,
                "status": "pending",
                "created_at": now,
            });
            (StatusCode::CREATED, axum::Json(json)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct AcceptRequestPayload {
    requester_id: String,
    accepter_id: String,
}

/// POST /api/connections/accept - Accept a pending request addressed to the
/// accepter. Fails with 404 if no matching pending edge exists in the
/// expected direction.
pub async fn accept_request_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<AcceptRequestPayload>,
) -> Response {
    let now = now_secs();
    let st = state.lock().await;

    match st
        .storage
        .accept_connection(&req.requester_id, &req.accepter_id, now)
    {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "no pending request to accept"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    // Tell the requester the outcome. Best-effort: a failed notification
    // write never unwinds the accept.
    let accepter_name = st
        .storage
        .get_profile(&req.accepter_id)
        .ok()
        .flatten()
        .map(|p| p.display_name)
        .unwrap_or_else(|| req.accepter_id.clone());
    match st.storage.insert_notification(&NotificationRow {
        id: 0,
        user_id: req.requester_id.clone(),
        title: "Connection Accepted".to_string(),
        content: format!("{accepter_name} accepted your connection request"),
        category: "connection_accepted".to_string(),
        sender_id: Some(req.accepter_id.clone()),
        created_at: now,
    }) {
        Ok(notification_id) => {
            let _ = st.ws_tx.send(WsEvent::NotificationCreated {
                notification_id,
                user_id: req.requester_id.clone(),
                category: "connection_accepted".to_string(),
            });
        }
        Err(e) => crate::tlog!("connection: failed to store accept notification: {}", e),
    }

    let _ = st.ws_tx.send(WsEvent::ConnectionAccepted {
        sender_id: req.requester_id.clone(),
        receiver_id: req.accepter_id.clone(),
    });

    crate::tlog!(
        "connection: {} accepted {}",
        crate::logging::user_id(&req.accepter_id),
        crate::logging::user_id(&req.requester_id)
    );
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"status": "accepted"})),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct CancelRequestPayload {
    requester_id: String,
    recipient_id: String,
}

/// POST /api/connections/cancel - Sender withdraws their pending request.
pub async fn cancel_request_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CancelRequestPayload>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .delete_pending_connection(&req.requester_id, &req.recipient_id)
    {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "cancelled"})),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "no pending request to cancel"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct RejectRequestPayload {
    requester_id: String,
    recipient_id: String,
}

/// POST /api/connections/reject - Recipient declines a pending request. The
/// edge is deleted, so the synthesized notification disappears on the next
/// fetch.
pub async fn reject_request_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<RejectRequestPayload>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .delete_pending_connection(&req.requester_id, &req.recipient_id)
    {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "rejected"})),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "no pending request to reject"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct RemoveConnectionPayload {
    user_a: String,
    user_b: String,
}

/// POST /api/connections/remove - Remove an accepted connection. The edge is
/// directional in storage; both directions are tried before reporting
/// not-found.
pub async fn remove_connection_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<RemoveConnectionPayload>,
) -> Response {
    let st = state.lock().await;
    match st.storage.remove_connection(&req.user_a, &req.user_b) {
        Ok(true) => {
            crate::tlog!(
                "connection: removed {} <-> {}",
                crate::logging::user_id(&req.user_a),
                crate::logging::user_id(&req.user_b)
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"status": "removed"})),
            )
                .into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "connection not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct ListConnectionsQuery {
    user_id: String,
}

/// GET /api/connections - Accepted connections of a user, each enriched with
/// the counterpart's profile.
pub async fn list_connections_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListConnectionsQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_connections(&query.user_id) {
        Ok(connections) => {
            let json: Vec<serde_json::Value> = connections
                .iter()
                .map(|c| {
                    let other_id = if c.sender_id == query.user_id {
                        &c.receiver_id
                    } else {
                        &c.sender_id
                    };
                    let other = st.storage.get_profile(other_id).ok().flatten();
                    serde_json::json!({
                        "id": c.id,
                        "sender_id": c.sender_id,
                        "receiver_id": c.receiver_id,
                        "status": c.status,
                        "created_at": c.created_at,
                        "updated_at": c.updated_at,
                        "profile": other.as_ref().map(profile_to_json),
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct ListPendingQuery {
    user_id: String,
    direction: Option<String>,
}

/// GET /api/connections/pending - Pending requests addressed to (incoming,
/// default) or sent by (outgoing) a user.
pub async fn list_pending_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListPendingQuery>,
) -> Response {
    let st = state.lock().await;
    let result = match query.direction.as_deref() {
        Some("outgoing") => st.storage.list_pending_requests_from(&query.user_id),
        _ => st.storage.list_pending_requests_to(&query.user_id),
    };
    match result {
        Ok(requests) => {
            let json: Vec<serde_json::Value> = requests
                .iter()
                .map(|c| {
                    let other_id = if c.sender_id == query.user_id {
                        &c.receiver_id
                    } else {
                        &c.sender_id
                    };
                    let other = st.storage.get_profile(other_id).ok().flatten();
                    serde_json::json!({
                        "id": c.id,
                        "sender_id": c.sender_id,
                        "receiver_id": c.receiver_id,
                        "status": c.status,
                        "created_at": c.created_at,
                        "profile": other.as_ref().map(profile_to_json),
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct ConnectionStatusQuery {
    user_a: String,
    user_b: String,
}

/// GET /api/connections/status - The active edge between two users, in
/// whichever direction it exists. Read paths go through this normalized
/// lookup so direction never matters to callers.
pub async fn connection_status_handler(
    State(state): State<SharedState>,
    Query(query): Query<ConnectionStatusQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.connection_between(&query.user_a, &query.user_b) {
        Ok(Some(c)) => {
            let json = serde_json::json!({
                "id": c.id,
                "sender_id": c.sender_id,
                "receiver_id": c.receiver_id,
                "status": c.status,
                "created_at": c.created_at,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(None) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "none"})),
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
