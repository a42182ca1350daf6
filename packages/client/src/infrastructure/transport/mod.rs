//! Realtime transport adapters.

pub mod websocket;

pub use websocket::WebSocketTransport;
