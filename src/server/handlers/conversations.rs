//! Conversation directory handlers: listing with enrichment, direct
//! get-or-create, message fetch, and read-marking.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::{SharedState, WsEvent};
use crate::server::utils::{api_error, message_to_json, now_secs, profile_to_json};

#[derive(Deserialize)]
pub struct ListConversationsQuery {
    user_id: String,
}

/// GET /api/conversations - Every conversation the user participates in,
/// most recently active first.
///
/// Each entry is enriched with the other participant's profile (direct) or
/// the group metadata (group), the most recent message, and the viewer's
/// unread count. Enrichment is per conversation and best-effort: a failed
/// sub-query yields empty/default fields for that conversation instead of
/// aborting the whole list.
pub async fn list_conversations_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListConversationsQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_conversations_for_user(&query.user_id) {
        Ok(conversations) => {
            let json: Vec<serde_json::Value> = conversations
                .iter()
                .map(|c| {
                    let last = st.storage.last_message(&c.conversation_id).ok().flatten();
                    let unread = st
                        .storage
                        .unread_count(&c.conversation_id, &query.user_id)
                        .unwrap_or(0);

                    if c.is_group {
                        let member_count = st
                            .storage
                            .list_group_members(&c.conversation_id)
                            .map(|m| m.len())
                            .unwrap_or(0);
                        serde_json::json!({
                            "conversation_id": c.conversation_id,
                            "is_group": true,
                            "group_name": c.group_name,
                            "group_description": c.group_description,
                            "group_avatar_url": c.group_avatar_url,
                            "created_by": c.created_by,
                            "member_count": member_count,
                            "last_message": last.as_ref().map(|m| message_to_json(m, &st.storage)),
                            "unread_count": unread,
                            "updated_at": c.updated_at,
                        })
                    } else {
                        let other = st
                            .storage
                            .participants_of(&c.conversation_id)
                            .unwrap_or_default()
                            .into_iter()
                            .find(|p| p.profile_id != query.user_id)
                            .and_then(|p| st.storage.get_profile(&p.profile_id).ok().flatten());
                        serde_json::json!({
                            "conversation_id": c.conversation_id,
                            "is_group": false,
                            "other_participant": other.as_ref().map(profile_to_json),
                            "last_message": last.as_ref().map(|m| message_to_json(m, &st.storage)),
                            "unread_count": unread,
                            "updated_at": c.updated_at,
                        })
                    }
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct GetOrCreateRequest {
    user_id: String,
    other_user_id: String,
}

/// POST /api/conversations/direct - Look up or create the direct
/// conversation between two users. At most one direct conversation exists
/// per unordered pair: an existing one is returned without any writes
/// (200), otherwise the conversation and both participant rows are created
/// (201). The two-step create compensates by deleting the conversation row
/// if the participant insert fails.
pub async fn get_or_create_direct_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<GetOrCreateRequest>,
) -> Response {
    if req.user_id.trim().is_empty() || req.other_user_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "user_id and other_user_id required");
    }

    let st = state.lock().await;

    match st
        .storage
        .find_direct_conversation(&req.user_id, &req.other_user_id)
    {
        Ok(Some(conversation_id)) => {
            let json = serde_json::json!({
                "conversation_id": conversation_id,
                "created": false,
            });
            return (StatusCode::OK, axum::Json(json)).into_response();
        }
        Ok(None) => {}
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let now = now_secs();
    match st
        .storage
        .create_direct_conversation(&req.user_id, &req.other_user_id, now)
    {
        Ok(conversation_id) => {
            crate::tlog!(
                "conversation: created {} for {} and {}",
                crate::logging::conv_id(&conversation_id),
                crate::logging::user_id(&req.user_id),
                crate::logging::user_id(&req.other_user_id)
            );
            let json = serde_json::json!({
                "conversation_id": conversation_id,
                "created": true,
            });
            (StatusCode::CREATED, axum::Json(json)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/conversations/:conversation_id/messages - All messages in
/// creation order, each with its sender's profile attached. The profile is
/// fetched per message, mirroring the one-lookup-per-message shape of the
/// original client.
pub async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_conversation_messages(&conversation_id) {
        Ok(messages) => {
            let json: Vec<serde_json::Value> = messages
                .iter()
                .map(|m| message_to_json(m, &st.storage))
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    user_id: String,
}

/// POST /api/conversations/:conversation_id/read - Stamp read_at on every
/// unread message not sent by the viewer. Idempotent; marking with nothing
/// unread is a silent no-op.
pub async fn mark_read_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    axum::Json(req): axum::Json<MarkReadRequest>,
) -> Response {
    let now = now_secs();
    let st = state.lock().await;
    match st
        .storage
        .mark_messages_read(&conversation_id, &req.user_id, now)
    {
        Ok(count) => {
            if count > 0 {
                let _ = st.ws_tx.send(WsEvent::MessagesRead {
                    conversation_id: conversation_id.clone(),
                    reader_id: req.user_id.clone(),
                    count,
                });
            }
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"marked_read": count})),
            )
                .into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
