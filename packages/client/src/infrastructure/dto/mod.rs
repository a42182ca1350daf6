//! Data Transfer Objects (DTOs) for the queue backend.
//!
//! DTOs are organized by protocol:
//! - `http`: REST request/response bodies
//! - `websocket`: realtime frame envelopes and payloads

pub mod conversion;
pub mod http;
pub mod websocket;
