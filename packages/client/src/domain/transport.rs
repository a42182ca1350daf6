//! Realtime transport port.
//!
//! A transport opens one bidirectional link authenticated with an access token.
//! The link is a pair of channels: commands go out through `outbound`, and
//! decoded events plus lifecycle signals come back through `inbound`.
//! Dropping the `outbound` sender closes the underlying connection.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    error::TransportError,
    event::{InboundEvent, RoomCommand},
    value_object::AccessToken,
};

/// Why a link went down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection
    ServerClosed,
    /// This client closed the connection on purpose
    ClientClosed,
    /// Read/write failure on the socket
    Network(String),
}

impl DisconnectReason {
    /// Whether an automatic reconnect should be attempted
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DisconnectReason::ClientClosed)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerClosed => write!(f, "closed by server"),
            DisconnectReason::ClientClosed => write!(f, "closed by client"),
            DisconnectReason::Network(message) => write!(f, "network error: {}", message),
        }
    }
}

/// What a live link reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Event(InboundEvent),
    /// `connect_error` raised by the server on an open link
    Error(String),
    Closed(DisconnectReason),
}

/// An open link
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<RoomCommand>,
    pub inbound: mpsc::UnboundedReceiver<TransportSignal>,
}

/// Opens realtime links
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, access_token: &AccessToken) -> Result<TransportLink, TransportError>;
}

/// Where room commands are emitted. Implemented by the connection manager.
pub trait RoomCommandSink: Send + Sync {
    fn is_connected(&self) -> bool;

    fn emit(&self, command: RoomCommand) -> Result<(), TransportError>;
}
