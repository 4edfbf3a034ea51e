//! Notification aggregation handler.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, profile_to_json};

#[derive(Deserialize)]
pub struct ListNotificationsQuery {
    user_id: String,
}

/// GET /api/notifications - The merged notification feed: stored rows plus
/// one synthesized entry per pending connection request addressed to the
/// user, newest first.
///
/// Synthesized entries carry `connection_id` = the requester's user id; the
/// accept/reject endpoints key off the (requester, recipient) pair, so that
/// identifier is exactly what a client passes back. Sender profiles are
/// attached per entry, degrading to null when a profile is missing.
pub async fn list_notifications_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.notification_feed(&query.user_id) {
        Ok(items) => {
            let json: Vec<serde_json::Value> = items
                .iter()
                .map(|n| {
                    let sender = n
                        .sender_id
                        .as_deref()
                        .and_then(|id| st.storage.get_profile(id).ok().flatten());
                    serde_json::json!({
                        "id": n.id,
                        "title": n.title,
                        "content": n.content,
                        "category": n.category,
                        "sender_id": n.sender_id,
                        "sender": sender.as_ref().map(profile_to_json),
                        "connection_id": n.connection_id,
                        "created_at": n.created_at,
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
