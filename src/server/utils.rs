//! Shared utility functions for the server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::{MessageRow, ProfileRow, Storage};

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build the JSON representation of a profile.
pub fn profile_to_json(p: &ProfileRow) -> serde_json::Value {
    serde_json::json!({
        "user_id": p.user_id,
        "display_name": p.display_name,
        "avatar_url": p.avatar_url,
        "role": p.role,
        "phone": p.phone,
        "bio": p.bio,
        "department": p.department,
        "prn": p.prn,
        "branch": p.branch,
        "year": p.year,
        "created_at": p.created_at,
        "updated_at": p.updated_at,
    })
}

/// Build the JSON representation of a message, attaching the sender's
/// profile when one exists. The profile lookup is per message; a missing or
/// failed lookup degrades to null rather than failing the response.
pub fn message_to_json(m: &MessageRow, storage: &Storage) -> serde_json::Value {
    let sender = storage.get_profile(&m.sender_id).ok().flatten();
    serde_json::json!({
        "message_id": m.message_id,
        "conversation_id": m.conversation_id,
        "sender_id": m.sender_id,
        "content": m.content,
        "created_at": m.created_at,
        "read_at": m.read_at,
        "sender": sender.as_ref().map(profile_to_json),
    })
}
