//! Web UI: REST snapshot endpoints and live meters over WebSocket

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{AppState, WebServer};
