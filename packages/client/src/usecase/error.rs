//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{ApiError, AuthError, StoreError};

/// Typed outcome of a failed queue command.
///
/// Precondition failures are never retried; they are surfaced to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Not connected to the queue server")]
    NotConnected,

    #[error("You already hold a token in a queue")]
    AlreadyQueued,

    #[error("No active queue for this clinic today")]
    NoActiveQueue,

    #[error("The queue for this clinic is paused")]
    QueueInactive,

    #[error("No token is currently being served")]
    NothingToComplete,

    #[error("No patients are waiting")]
    QueueEmpty,

    #[error("This action is not available for your role")]
    NotPermitted,

    #[error("Session expired, please sign in again")]
    AuthExpired,

    #[error("The session ended before the command finished")]
    SessionEnded,

    #[error("Left the queue before the join finished")]
    JoinCancelled,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<ApiError> for CommandError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized => CommandError::AuthExpired,
            other => CommandError::NetworkError(other.to_string()),
        }
    }
}

/// Errors starting or restarting a session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No stored credential, sign in first")]
    NotAuthenticated,

    #[error("The session is already running")]
    AlreadyRunning,

    #[error("The session is not running")]
    NotRunning,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthError> for SessionError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::AuthExpired => SessionError::NotAuthenticated,
            AuthError::Store(store) => SessionError::Store(store),
        }
    }
}
