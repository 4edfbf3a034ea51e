//! WebSocket upgrade and scoped change-feed subscriptions.
//!
//! Every client subscribes to the shared broadcast channel; this module is
//! the filter between the firehose and each socket. Two scopes exist:
//!
//! - conversation scope (`?user=U&conversation=C`): message insert and
//!   read-update events for one conversation, the feed a client holds open
//!   while viewing a chat;
//! - user scope (`?user=U`): message inserts from other senders in any
//!   conversation the user participates in, connection events involving the
//!   user, and the user's stored-notification events — the coarse signal a
//!   client uses to refetch its conversation or notification list.
//!
//! A subscription lives exactly as long as its socket: the task ends on
//! disconnect and the broadcast receiver is dropped with it.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::server::config::MAX_WS_CONNECTIONS;
use crate::server::state::{SharedState, WsEvent};
use crate::server::utils::api_error;

#[derive(Deserialize)]
pub struct WsQuery {
    user: String,
    conversation: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<SharedState>,
) -> Response {
    if query.user.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "user cannot be empty");
    }

    // Check connection limit before upgrading
    let ws_count = {
        let st = state.lock().await;
        st.ws_connection_count.clone()
    };

    let current = ws_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many WebSocket connections (max {MAX_WS_CONNECTIONS})"),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, query.user, query.conversation))
        .into_response()
}

async fn ws_connection(
    mut socket: WebSocket,
    state: SharedState,
    user: String,
    conversation: Option<String>,
) {
    // Subscribe to the broadcast channel and increment connection count
    let (mut rx, ws_count) = {
        let st = state.lock().await;
        let count = st.ws_connection_count.clone();
        count.fetch_add(1, Ordering::Relaxed);
        (st.ws_tx.subscribe(), count)
    };

    loop {
        tokio::select! {
            // Forward broadcast events matching this subscription's scope
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !should_forward(&state, &event, &user, conversation.as_deref()).await {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::tlog!("ws client lagged, skipped {n} events");
                        // Notify client so it can refetch
                        let lag_msg = serde_json::json!({
                            "type": "events_missed",
                            "count": n,
                        });
                        if let Ok(json) = serde_json::to_string(&lag_msg) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Handle incoming frames from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    _ => {} // ignore other client messages
                }
            }
        }
    }

    // Decrement connection count on disconnect
    ws_count.fetch_sub(1, Ordering::Relaxed);
}

/// Decide whether an event belongs to this subscription's scope.
async fn should_forward(
    state: &SharedState,
    event: &WsEvent,
    user: &str,
    conversation: Option<&str>,
) -> bool {
    if let Some(conv) = conversation {
        return match event {
            WsEvent::NewMessage {
                conversation_id, ..
            }
            | WsEvent::MessagesRead {
                conversation_id, ..
            } => conversation_id == conv,
            _ => false,
        };
    }

    match event {
        WsEvent::NewMessage {
            conversation_id,
            sender_id,
            ..
        } => {
            // The user's own sends don't need an invalidation signal
            if sender_id == user {
                return false;
            }
            let st = state.lock().await;
            st.storage.is_participant(conversation_id, user).unwrap_or(false)
        }
        WsEvent::MessagesRead { .. } => false,
        WsEvent::ConnectionRequest { receiver_id, .. } => receiver_id == user,
        WsEvent::ConnectionAccepted {
            sender_id,
            receiver_id,
        } => sender_id == user || receiver_id == user,
        WsEvent::NotificationCreated { user_id, .. } => user_id == user,
    }
}
