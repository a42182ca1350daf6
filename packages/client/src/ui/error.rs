//! Error types for the CLI client.

use thiserror::Error;

use crate::{domain::ApiError, usecase::SessionError};

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Session could not be started
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// HTTP client could not be built
    #[error("Setup error: {0}")]
    Setup(#[from] ApiError),
}
