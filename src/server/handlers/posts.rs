//! Social feed handlers: posts, likes, comments, polls.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::server::config::MIN_POLL_OPTIONS;
use crate::server::state::SharedState;
use crate::server::utils::{api_error, now_secs, profile_to_json};
use crate::storage::{CommentRow, PollRow, PostRow, Storage};

#[derive(Deserialize)]
pub struct CreatePollPayload {
    question: String,
    options: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    author_id: String,
    #[serde(default)]
    content: String,
    media_url: Option<String>,
    poll: Option<CreatePollPayload>,
}

/// POST /api/posts - Create a feed post: text, media, poll, or a mix.
///
/// A post must carry something: content, a media URL, or a poll. Polls need
/// a question and at least two options. The poll row is written before the
/// post row; a failed post insert deletes the poll again so no unattached
/// poll survives.
pub async fn create_post_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreatePostRequest>,
) -> Response {
    if req.author_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "author_id cannot be empty");
    }
    let content = req.content.trim();
    if content.is_empty() && req.media_url.is_none() && req.poll.is_none() {
        return api_error(StatusCode::BAD_REQUEST, "post cannot be empty");
    }
    if let Some(ref poll) = req.poll {
        if poll.question.trim().is_empty() {
            return api_error(StatusCode::BAD_REQUEST, "poll question cannot be empty");
        }
        let options: Vec<&str> = poll
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < MIN_POLL_OPTIONS {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("a poll needs at least {MIN_POLL_OPTIONS} options"),
            );
        }
    }

    let now = now_secs();
    let st = state.lock().await;

    let poll_id = match req.poll {
        Some(ref poll) => {
            let row = PollRow {
                poll_id: Uuid::new_v4().to_string(),
                question: poll.question.trim().to_string(),
                options: poll
                    .options
                    .iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                created_at: now,
            };
            if let Err(e) = st.storage.insert_poll(&row) {
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
            Some(row.poll_id)
        }
        None => None,
    };

    let row = PostRow {
        post_id: Uuid::new_v4().to_string(),
        author_id: req.author_id.clone(),
        content: content.to_string(),
        media_url: req.media_url.clone(),
        poll_id: poll_id.clone(),
        created_at: now,
    };
    if let Err(e) = st.storage.insert_post(&row) {
        if let Some(ref pid) = poll_id {
            let _ = st.storage.delete_poll(pid);
        }
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    crate::tlog!(
        "feed: {} posted {}",
        crate::logging::user_id(&row.author_id),
        row.post_id
    );

    let json = serde_json::json!({
        "post_id": row.post_id,
        "author_id": row.author_id,
        "content": row.content,
        "media_url": row.media_url,
        "poll_id": row.poll_id,
        "created_at": row.created_at,
    });
    (StatusCode::CREATED, axum::Json(json)).into_response()
}

fn post_to_json(p: &PostRow, viewer_id: &str, storage: &Storage) -> serde_json::Value {
    let author = storage.get_profile(&p.author_id).ok().flatten();
    let like_count = storage.count_post_likes(&p.post_id).unwrap_or(0);
    let liked = storage.has_liked(&p.post_id, viewer_id).unwrap_or(false);
    let comment_count = storage.count_comments(&p.post_id).unwrap_or(0);

    let poll = p.poll_id.as_deref().and_then(|poll_id| {
        let poll = storage.get_poll(poll_id).ok().flatten()?;
        let votes = storage
            .poll_vote_counts(poll_id, poll.options.len())
            .unwrap_or_else(|_| vec![0; poll.options.len()]);
        let your_vote = storage.get_poll_vote(poll_id, viewer_id).ok().flatten();
        Some(serde_json::json!({
            "poll_id": poll.poll_id,
            "question": poll.question,
            "options": poll.options,
            "votes": votes,
            "your_vote": your_vote,
        }))
    });

    serde_json::json!({
        "post_id": p.post_id,
        "author_id": p.author_id,
        "author": author.as_ref().map(profile_to_json),
        "content": p.content,
        "media_url": p.media_url,
        "poll": poll,
        "like_count": like_count,
        "liked": liked,
        "comment_count": comment_count,
        "created_at": p.created_at,
    })
}

#[derive(Deserialize)]
pub struct ListPostsQuery {
    viewer_id: String,
}

/// GET /api/posts - The feed, newest first, enriched per post with author
/// profile, like/comment counts, the viewer's like state and poll tallies.
pub async fn list_posts_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListPostsQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_posts() {
        Ok(posts) => {
            let json: Vec<serde_json::Value> = posts
                .iter()
                .map(|p| post_to_json(p, &query.viewer_id, &st.storage))
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct LikeRequest {
    profile_id: String,
}

/// POST /api/posts/:post_id/like - Like a post. Liking twice is a no-op.
pub async fn like_post_handler(
    State(state): State<SharedState>,
    Path(post_id): Path<String>,
    axum::Json(req): axum::Json<LikeRequest>,
) -> Response {
    let now = now_secs();
    let st = state.lock().await;

    match st.storage.get_post(&post_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "post not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    match st.storage.insert_post_like(&post_id, &req.profile_id, now) {
        Ok(_) => {
            let count = st.storage.count_post_likes(&post_id).unwrap_or(0);
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"liked": true, "like_count": count})),
            )
                .into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/posts/:post_id/unlike - Remove a like.
pub async fn unlike_post_handler(
    State(state): State<SharedState>,
    Path(post_id): Path<String>,
    axum::Json(req): axum::Json<LikeRequest>,
) -> Response {
    let st = state.lock().await;
    match st.storage.delete_post_like(&post_id, &req.profile_id) {
        Ok(_) => {
            let count = st.storage.count_post_likes(&post_id).unwrap_or(0);
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"liked": false, "like_count": count})),
            )
                .into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/posts/:post_id/comments - Comments in creation order with
/// author profiles.
pub async fn list_comments_handler(
    State(state): State<SharedState>,
    Path(post_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_comments(&post_id) {
        Ok(comments) => {
            let json: Vec<serde_json::Value> = comments
                .iter()
                .map(|c| {
                    let author = st.storage.get_profile(&c.author_id).ok().flatten();
                    serde_json::json!({
                        "comment_id": c.comment_id,
                        "post_id": c.post_id,
                        "author_id": c.author_id,
                        "author": author.as_ref().map(profile_to_json),
                        "content": c.content,
                        "created_at": c.created_at,
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    author_id: String,
    content: String,
}

/// POST /api/posts/:post_id/comments - Comment on a post.
pub async fn create_comment_handler(
    State(state): State<SharedState>,
    Path(post_id): Path<String>,
    axum::Json(req): axum::Json<CreateCommentRequest>,
) -> Response {
    let content = req.content.trim();
    if content.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "comment cannot be empty");
    }

    let now = now_secs();
    let st = state.lock().await;

    match st.storage.get_post(&post_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "post not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let row = CommentRow {
        comment_id: Uuid::new_v4().to_string(),
        post_id: post_id.clone(),
        author_id: req.author_id.clone(),
        content: content.to_string(),
        created_at: now,
    };
    match st.storage.insert_comment(&row) {
        Ok(()) => {
            let json = serde_json::json!({
                "comment_id": row.comment_id,
                "post_id": row.post_id,
                "author_id": row.author_id,
                "content": row.content,
                "created_at": row.created_at,
            });
            (StatusCode::CREATED, axum::Json(json)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct VoteRequest {
    voter_id: String,
    option_index: u32,
}

/// POST /api/polls/:poll_id/vote - Vote on a poll option. One vote per
/// user; a re-vote replaces the previous choice.
pub async fn vote_poll_handler(
    State(state): State<SharedState>,
    Path(poll_id): Path<String>,
    axum::Json(req): axum::Json<VoteRequest>,
) -> Response {
    let now = now_secs();
    let st = state.lock().await;

    let poll = match st.storage.get_poll(&poll_id) {
        Ok(Some(p)) => p,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "poll not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    if req.option_index as usize >= poll.options.len() {
        return api_error(StatusCode::BAD_REQUEST, "option_index out of range");
    }

    if let Err(e) = st
        .storage
        .upsert_poll_vote(&poll_id, &req.voter_id, req.option_index, now)
    {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let votes = st
        .storage
        .poll_vote_counts(&poll_id, poll.options.len())
        .unwrap_or_else(|_| vec![0; poll.options.len()]);
    let json = serde_json::json!({
        "poll_id": poll_id,
        "votes": votes,
        "your_vote": req.option_index,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
