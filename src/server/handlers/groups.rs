//! Group conversation handlers: creation, membership, roles, leaving.
//!
//! The role permission model (lead may manage membership and promote or
//! demote admins) is enforced by the client UI, not here; the data layer
//! accepts membership mutations from any caller. The one rule the server
//! does own is that a lead cannot leave its own group — there is no
//! transfer-leadership operation, so a departing lead would orphan the
//! group.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, now_secs, profile_to_json};
use crate::storage::LeaveOutcome;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    name: String,
    description: Option<String>,
    avatar_url: Option<String>,
    member_ids: Vec<String>,
    creator_id: String,
}

/// POST /api/groups - Create a group conversation. The creator becomes the
/// sole lead; listed members join as members and are mirrored into the
/// shared participant table.
pub async fn create_group_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateGroupRequest>,
) -> Response {
    if req.name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "group name cannot be empty");
    }
    if req.creator_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "creator_id cannot be empty");
    }

    let now = now_secs();
    let st = state.lock().await;
    match st.storage.create_group_conversation(
        req.name.trim(),
        req.description.as_deref(),
        req.avatar_url.as_deref(),
        &req.creator_id,
        &req.member_ids,
        now,
    ) {
        Ok(conversation_id) => {
            let members = st
                .storage
                .list_group_members(&conversation_id)
                .unwrap_or_default();
            crate::tlog!(
                "group: {} created {} with {} members",
                crate::logging::user_id(&req.creator_id),
                crate::logging::conv_id(&conversation_id),
                members.len()
            );
            let member_json: Vec<serde_json::Value> = members
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "profile_id": m.profile_id,
                        "role": m.role,
                        "joined_at": m.joined_at,
                    })
                })
                .collect();
            let json = serde_json::json!({
                "conversation_id": conversation_id,
                "group_name": req.name.trim(),
                "group_description": req.description,
                "created_by": req.creator_id,
                "members": member_json,
                "created_at": now,
            });
            (StatusCode::CREATED, axum::Json(json)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/groups/:conversation_id - Group metadata plus the member list
/// with roles and profiles.
pub async fn get_group_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let conversation = match st.storage.get_conversation(&conversation_id) {
        Ok(Some(c)) if c.is_group => c,
        Ok(_) => return api_error(StatusCode::NOT_FOUND, "group not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let members = st
        .storage
        .list_group_members(&conversation_id)
        .unwrap_or_default();
    let member_json: Vec<serde_json::Value> = members
        .iter()
        .map(|m| {
            let profile = st.storage.get_profile(&m.profile_id).ok().flatten();
            serde_json::json!({
                "profile_id": m.profile_id,
                "role": m.role,
                "joined_at": m.joined_at,
                "added_by": m.added_by,
                "profile": profile.as_ref().map(profile_to_json),
            })
        })
        .collect();

    let json = serde_json::json!({
        "conversation_id": conversation.conversation_id,
        "group_name": conversation.group_name,
        "group_description": conversation.group_description,
        "group_avatar_url": conversation.group_avatar_url,
        "created_by": conversation.created_by,
        "created_at": conversation.created_at,
        "updated_at": conversation.updated_at,
        "members": member_json,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    profile_id: String,
    added_by: String,
}

/// POST /api/groups/:conversation_id/members - Add a member (role: member).
pub async fn add_member_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    axum::Json(req): axum::Json<AddMemberRequest>,
) -> Response {
    if req.profile_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "profile_id cannot be empty");
    }

    let now = now_secs();
    let st = state.lock().await;

    match st.storage.get_conversation(&conversation_id) {
        Ok(Some(c)) if c.is_group => {}
        Ok(_) => return api_error(StatusCode::NOT_FOUND, "group not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    match st
        .storage
        .add_group_member(&conversation_id, &req.profile_id, &req.added_by, now)
    {
        Ok(()) => {
            crate::tlog!(
                "group: {} added {} to {}",
                crate::logging::user_id(&req.added_by),
                crate::logging::user_id(&req.profile_id),
                crate::logging::conv_id(&conversation_id)
            );
            let json = serde_json::json!({
                "status": "added",
                "conversation_id": conversation_id,
                "profile_id": req.profile_id,
                "role": "member",
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /api/groups/:conversation_id/members/:profile_id - Remove a member
/// from both membership tables. Serves admin-initiated removal; self-leave
/// goes through the leave handler so the lead check applies.
pub async fn remove_member_handler(
    State(state): State<SharedState>,
    Path((conversation_id, profile_id)): Path<(String, String)>,
) -> Response {
    let st = state.lock().await;
    match st.storage.remove_group_member(&conversation_id, &profile_id) {
        Ok(true) => {
            let json = serde_json::json!({
                "status": "removed",
                "conversation_id": conversation_id,
                "profile_id": profile_id,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "group member not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    role: String,
}

/// POST /api/groups/:conversation_id/members/:profile_id/role - Set a
/// member's role to admin or member. The lead role is fixed at creation and
/// cannot be assigned.
pub async fn update_role_handler(
    State(state): State<SharedState>,
    Path((conversation_id, profile_id)): Path<(String, String)>,
    axum::Json(req): axum::Json<UpdateRoleRequest>,
) -> Response {
    if req.role != "admin" && req.role != "member" {
        return api_error(StatusCode::BAD_REQUEST, "role must be admin or member");
    }

    let st = state.lock().await;
    match st
        .storage
        .update_group_member_role(&conversation_id, &profile_id, &req.role)
    {
        Ok(true) => {
            let json = serde_json::json!({
                "status": "updated",
                "profile_id": profile_id,
                "role": req.role,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "group member not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct LeaveGroupRequest {
    user_id: String,
}

/// POST /api/groups/:conversation_id/leave - Leave a group. Refused for the
/// lead: with no transfer-leadership operation, a departing lead would leave
/// the group unmanageable.
pub async fn leave_group_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    axum::Json(req): axum::Json<LeaveGroupRequest>,
) -> Response {
    let st = state.lock().await;

    match st.storage.leave_group(&conversation_id, &req.user_id) {
        Ok(LeaveOutcome::Left) => {
            crate::tlog!(
                "group: {} left {}",
                crate::logging::user_id(&req.user_id),
                crate::logging::conv_id(&conversation_id)
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"status": "left"})),
            )
                .into_response()
        }
        Ok(LeaveOutcome::NotMember) => api_error(StatusCode::NOT_FOUND, "not a member of this group"),
        Ok(LeaveOutcome::LeadRefused) => {
            api_error(StatusCode::BAD_REQUEST, "the group lead cannot leave")
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
