//! Profile management handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, now_secs, profile_to_json};
use crate::storage::{ProfileRow, StorageError};

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    user_id: String,
    display_name: String,
    avatar_url: Option<String>,
    role: Option<String>,
    phone: Option<String>,
    bio: Option<String>,
    department: Option<String>,
    prn: Option<String>,
    branch: Option<String>,
    year: Option<String>,
}

/// POST /api/profiles - Create a profile at signup.
pub async fn create_profile_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateProfileRequest>,
) -> Response {
    if req.user_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "user_id cannot be empty");
    }
    if req.display_name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "display_name cannot be empty");
    }
    let role = req.role.clone().unwrap_or_else(|| "student".to_string());
    if role != "student" && role != "admin" {
        return api_error(StatusCode::BAD_REQUEST, "role must be student or admin");
    }

    let now = now_secs();
    let row = ProfileRow {
        user_id: req.user_id.trim().to_string(),
        display_name: req.display_name.trim().to_string(),
        avatar_url: req.avatar_url,
        role,
        phone: req.phone,
        bio: req.bio,
        department: req.department,
        prn: req.prn,
        branch: req.branch,
        year: req.year,
        created_at: now,
        updated_at: now,
    };

    let st = state.lock().await;
    match st.storage.insert_profile(&row) {
        Ok(()) => {
            crate::tlog!("profile: created {}", crate::logging::user_id(&row.user_id));
            (StatusCode::CREATED, axum::Json(profile_to_json(&row))).into_response()
        }
        Err(StorageError::AlreadyExists(_)) => {
            api_error(StatusCode::CONFLICT, "profile already exists")
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/profiles/:user_id
pub async fn get_profile_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_profile(&user_id) {
        Ok(Some(profile)) => {
            (StatusCode::OK, axum::Json(profile_to_json(&profile))).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, "profile not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    display_name: Option<String>,
    avatar_url: Option<String>,
    phone: Option<String>,
    bio: Option<String>,
    department: Option<String>,
    prn: Option<String>,
    branch: Option<String>,
    year: Option<String>,
}

/// PUT /api/profiles/:user_id - Owner settings mutation. Fields left out of
/// the request keep their stored value.
pub async fn update_profile_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<UpdateProfileRequest>,
) -> Response {
    let st = state.lock().await;

    let mut profile = match st.storage.get_profile(&user_id) {
        Ok(Some(p)) => p,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "profile not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    if let Some(name) = req.display_name {
        if name.trim().is_empty() {
            return api_error(StatusCode::BAD_REQUEST, "display_name cannot be empty");
        }
        profile.display_name = name.trim().to_string();
    }
    if req.avatar_url.is_some() {
        profile.avatar_url = req.avatar_url;
    }
    if req.phone.is_some() {
        profile.phone = req.phone;
    }
    if req.bio.is_some() {
        profile.bio = req.bio;
    }
    if req.department.is_some() {
        profile.department = req.department;
    }
    if req.prn.is_some() {
        profile.prn = req.prn;
    }
    if req.branch.is_some() {
        profile.branch = req.branch;
    }
    if req.year.is_some() {
        profile.year = req.year;
    }
    profile.updated_at = now_secs();

    match st.storage.update_profile(&profile) {
        Ok(true) => (StatusCode::OK, axum::Json(profile_to_json(&profile))).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "profile not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct SearchProfilesQuery {
    user_id: String,
    q: String,
}

/// GET /api/profiles/search - Search by display name, restricted to the
/// caller's accepted connections. Users outside that set are not
/// discoverable through this path.
pub async fn search_profiles_handler(
    State(state): State<SharedState>,
    Query(query): Query<SearchProfilesQuery>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .search_connected_profiles(&query.user_id, query.q.trim())
    {
        Ok(profiles) => {
            let json: Vec<serde_json::Value> = profiles.iter().map(profile_to_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
