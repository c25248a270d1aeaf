//! HTTP and WebSocket request handlers.

pub mod availability;
pub mod health;
pub mod messages;
pub mod options;
pub mod participants;
pub mod preferences;
pub mod trips;
pub mod users;
pub mod votes;
pub mod websocket;
