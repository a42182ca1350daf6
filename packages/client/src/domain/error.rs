//! Domain layer error definitions.

use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// Identifier or credential is empty
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Identifier exceeds the maximum length
    #[error("{kind} cannot exceed {max} characters (got {actual})")]
    TooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },
}

/// Errors raised by a credential store adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Credential store I/O failed: {0}")]
    Io(String),

    #[error("Stored credential is unreadable: {0}")]
    Corrupted(String),
}

/// Errors from the credential refresh flow.
///
/// `Clone` because a single refresh outcome is handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable refresh credential, or the backend rejected it. The session must log out.
    #[error("Authentication expired, please sign in again")]
    AuthExpired,

    #[error("Credential store failure during refresh: {0}")]
    Store(#[from] StoreError),
}

/// Errors from REST calls against the queue backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Still unauthorized after the shared refresh, or no credential at all
    #[error("Unauthorized")]
    Unauthorized,

    /// Non-success HTTP status or `success: false` envelope
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Body could not be decoded into the expected shape
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

/// Errors from the realtime transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The handshake was refused; carries the server's reason (`connect_error`)
    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Transport I/O error: {0}")]
    Io(String),

    /// No live link to send on
    #[error("Not connected")]
    NotConnected,
}

impl TransportError {
    /// Whether the failure means the handshake credential is stale or invalid.
    pub fn is_auth_related(&self) -> bool {
        match self {
            TransportError::Handshake(message) | TransportError::Io(message) => {
                is_auth_failure(message)
            }
            TransportError::NotConnected => false,
        }
    }
}

const AUTH_SIGNATURES: [&str; 5] = ["auth", "token", "unauthorized", "jwt", "401"];

/// Classify a transport error message as authentication-related.
pub fn is_auth_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    AUTH_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}
