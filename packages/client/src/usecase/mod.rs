//! UseCase layer: the queue session components.

pub mod auth_refresh;
pub mod command;
pub mod connection;
pub mod error;
pub mod room_tracker;
pub mod session;
pub mod store;

pub use auth_refresh::AuthRefreshCoordinator;
pub use command::{CommandDispatcher, Dispatch};
pub use connection::{ConnectionManager, LinkSignal, ReconnectPolicy};
pub use error::{CommandError, SessionError};
pub use room_tracker::RoomSubscriptionTracker;
pub use session::{QueueSession, SessionDeps};
pub use store::{SessionSnapshot, SessionStore};
