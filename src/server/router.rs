//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::server::handlers;
use crate::server::state::SharedState;
use crate::server::static_files::static_handler;

/// Build the complete Axum router with all API routes and static file serving.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Profiles API
        .route(
            "/api/profiles",
            post(handlers::profiles::create_profile_handler),
        )
        .route(
            "/api/profiles/search",
            get(handlers::profiles::search_profiles_handler),
        )
        .route(
            "/api/profiles/:user_id",
            get(handlers::profiles::get_profile_handler)
                .put(handlers::profiles::update_profile_handler),
        )
        // Connections API
        .route(
            "/api/connections",
            get(handlers::connections::list_connections_handler)
                .post(handlers::connections::send_request_handler),
        )
        .route(
            "/api/connections/pending",
            get(handlers::connections::list_pending_handler),
        )
        .route(
            "/api/connections/status",
            get(handlers::connections::connection_status_handler),
        )
        .route(
            "/api/connections/accept",
            post(handlers::connections::accept_request_handler),
        )
        .route(
            "/api/connections/reject",
            post(handlers::connections::reject_request_handler),
        )
        .route(
            "/api/connections/cancel",
            post(handlers::connections::cancel_request_handler),
        )
        .route(
            "/api/connections/remove",
            post(handlers::connections::remove_connection_handler),
        )
        // Conversations API
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations_handler),
        )
        .route(
            "/api/conversations/direct",
            post(handlers::conversations::get_or_create_direct_handler),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(handlers::conversations::list_messages_handler),
        )
        .route(
            "/api/conversations/:conversation_id/read",
            post(handlers::conversations::mark_read_handler),
        )
        // Messages API
        .route(
            "/api/messages",
            post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/messages/:message_id",
            get(handlers::messages::get_message_handler),
        )
        // Groups API
        .route("/api/groups", post(handlers::groups::create_group_handler))
        .route(
            "/api/groups/:conversation_id",
            get(handlers::groups::get_group_handler),
        )
        .route(
            "/api/groups/:conversation_id/members",
            post(handlers::groups::add_member_handler),
        )
        .route(
            "/api/groups/:conversation_id/members/:profile_id",
            axum::routing::delete(handlers::groups::remove_member_handler),
        )
        .route(
            "/api/groups/:conversation_id/members/:profile_id/role",
            post(handlers::groups::update_role_handler),
        )
        .route(
            "/api/groups/:conversation_id/leave",
            post(handlers::groups::leave_group_handler),
        )
        // Notifications API
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications_handler),
        )
        // Feed API
        .route(
            "/api/posts",
            get(handlers::posts::list_posts_handler).post(handlers::posts::create_post_handler),
        )
        .route(
            "/api/posts/:post_id/like",
            post(handlers::posts::like_post_handler),
        )
        .route(
            "/api/posts/:post_id/unlike",
            post(handlers::posts::unlike_post_handler),
        )
        .route(
            "/api/posts/:post_id/comments",
            get(handlers::posts::list_comments_handler)
                .post(handlers::posts::create_comment_handler),
        )
        .route(
            "/api/polls/:poll_id/vote",
            post(handlers::posts::vote_poll_handler),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        // Static fallback
        .fallback(get(static_handler))
        .with_state(state)
}
