//! Message sending and retrieval handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::server::state::{SharedState, WsEvent};
use crate::server::utils::{api_error, message_to_json, now_secs};
use crate::storage::MessageRow;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    conversation_id: String,
    sender_id: String,
    content: String,
}

/// POST /api/messages - Append a message to a conversation.
///
/// Empty or whitespace-only content is rejected before any storage call.
/// The conversation's last-activity bump is best-effort: a failure (or a
/// missing conversation row) is logged and the send proceeds. The response
/// is the bare message row without sender-profile enrichment — the caller
/// already knows its own profile and attaches it locally.
pub async fn send_message_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    let content = req.content.trim();
    if content.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "message content cannot be empty");
    }

    let now = now_secs();
    let st = state.lock().await;

    match st.storage.touch_conversation(&req.conversation_id, now) {
        Ok(true) => {}
        Ok(false) => crate::tlog!(
            "send: conversation {} missing, updated_at not bumped",
            crate::logging::conv_id(&req.conversation_id)
        ),
        Err(e) => crate::tlog!("send: failed to bump conversation updated_at: {}", e),
    }

    let row = MessageRow {
        message_id: Uuid::new_v4().to_string(),
        conversation_id: req.conversation_id.clone(),
        sender_id: req.sender_id.clone(),
        content: content.to_string(),
        created_at: now,
        read_at: None,
    };
    if let Err(e) = st.storage.insert_message(&row) {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let _ = st.ws_tx.send(WsEvent::NewMessage {
        message_id: row.message_id.clone(),
        conversation_id: row.conversation_id.clone(),
        sender_id: row.sender_id.clone(),
        content: row.content.clone(),
        created_at: now,
    });

    crate::tlog!(
        "send: message {} to {} from {}",
        crate::logging::msg_id(&row.message_id),
        crate::logging::conv_id(&row.conversation_id),
        crate::logging::user_id(&row.sender_id)
    );

    let json = serde_json::json!({
        "message_id": row.message_id,
        "conversation_id": row.conversation_id,
        "sender_id": row.sender_id,
        "content": row.content,
        "created_at": row.created_at,
        "read_at": null,
    });
    (StatusCode::CREATED, axum::Json(json)).into_response()
}

/// GET /api/messages/:message_id
pub async fn get_message_handler(
    State(state): State<SharedState>,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_message(&message_id) {
        Ok(Some(m)) => {
            let json = message_to_json(&m, &st.storage);
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
