//! Shared application state and realtime event types.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::storage::Storage;

/// Change-feed events broadcast to connected WebSocket clients. Each event
/// names the rows it concerns; the subscription layer decides per-client
/// whether to forward based on the client's scope (conversation or user).
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    NewMessage {
        message_id: String,
        conversation_id: String,
        sender_id: String,
        content: String,
        created_at: u64,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
        count: u32,
    },
    ConnectionRequest {
        sender_id: String,
        receiver_id: String,
    },
    ConnectionAccepted {
        sender_id: String,
        receiver_id: String,
    },
    NotificationCreated {
        notification_id: i64,
        user_id: String,
        category: String,
    },
}

pub struct AppState {
    pub storage: Storage,
    pub ws_tx: broadcast::Sender<WsEvent>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

pub type SharedState = Arc<Mutex<AppState>>;
