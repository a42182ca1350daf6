//! Real-time queue session for Qure clinics.
//!
//! Layers:
//! - `domain`: value objects, models, the event reconciler and the port traits
//! - `usecase`: connection, refresh, room tracking, commands and the session facade
//! - `infrastructure`: reqwest / tokio-tungstenite / credential store adapters
//! - `ui`: interactive CLI

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use infrastructure::build_session;
pub use usecase::{CommandError, Dispatch, QueueSession, SessionError, SessionSnapshot};
