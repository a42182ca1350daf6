//! Domain layer for the queue session.
//!
//! Value objects, models, the pure event reconciler, and the port traits the
//! use cases depend on. Nothing here performs I/O.

pub mod api;
pub mod error;
pub mod event;
pub mod model;
pub mod reconciler;
pub mod repository;
pub mod transport;
pub mod value_object;

pub use api::{AuthApi, QueueApi};
pub use error::{ApiError, AuthError, StoreError, TransportError, ValueObjectError, is_auth_failure};
pub use event::{InboundEvent, Notice, NoticeKind, RoomCommand};
pub use model::{
    ActiveToken, ConnectionState, Credential, DeviceInfo, Queue, QueueHandle, QueueStatus, Role,
    TokenStatus, UserIdentity,
};
pub use reconciler::{IgnoreReason, Outcome, QueueState, ReconcileContext, reconcile};
pub use repository::CredentialStore;
pub use transport::{DisconnectReason, RoomCommandSink, Transport, TransportLink, TransportSignal};
pub use value_object::{AccessToken, ClinicId, QueueId, RefreshToken, TokenId, UserId};

#[cfg(test)]
pub use api::{MockAuthApi, MockQueueApi};
