//! HTTP request handlers, grouped by API area.

pub mod connections;
pub mod conversations;
pub mod groups;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod websocket;
