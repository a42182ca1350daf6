//! REST adapters for the `AuthApi` / `QueueApi` ports.

pub mod http;

pub use http::{HttpAuthApi, HttpQueueApi, build_http_client};
