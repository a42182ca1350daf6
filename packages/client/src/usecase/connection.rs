//! UseCase: 接続管理（再接続とリフレッシュ連携）
//!
//! Owns the single realtime link of a session. A supervisor task opens the link,
//! forwards what it reports as [`LinkSignal`]s, and decides what happens when it
//! goes down:
//!
//! - peer/network closure: bounded automatic retry, then terminal `Disconnected`
//! - authentication failure: `AuthFailed`, hand over to the refresh coordinator, and
//!   retry once with the new token; never retry with the stale one
//! - explicit `disconnect()`: stop, no retry

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, watch},
    task::JoinHandle,
};

use crate::domain::{
    AccessToken, AuthError, ConnectionState, Credential, CredentialStore, DisconnectReason,
    InboundEvent, RoomCommand, RoomCommandSink, Transport, TransportError, TransportLink,
    TransportSignal, is_auth_failure,
};

use super::auth_refresh::AuthRefreshCoordinator;

/// Bounded automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Ordered link lifecycle and traffic, consumed by the session driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    Up,
    Down(DisconnectReason),
    Event(InboundEvent),
    /// Refresh failed or the refreshed token was rejected too
    AuthLost,
}

enum LinkEnd {
    Closed(DisconnectReason),
    Error(String),
}

enum Failure {
    Auth(String),
    Recoverable(String),
}

struct Shared {
    transport: Arc<dyn Transport>,
    refresher: Arc<AuthRefreshCoordinator>,
    credentials: Arc<dyn CredentialStore>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<RoomCommand>>>,
    signals: mpsc::UnboundedSender<LinkSignal>,
}

/// Connection Manager
pub struct ConnectionManager {
    shared: Arc<Shared>,
    supervisor: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        refresher: Arc<AuthRefreshCoordinator>,
        credentials: Arc<dyn CredentialStore>,
        policy: ReconnectPolicy,
        signals: mpsc::UnboundedSender<LinkSignal>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                transport,
                refresher,
                credentials,
                policy,
                state,
                outbound: Mutex::new(None),
                signals,
            }),
            supervisor: AsyncMutex::new(None),
        }
    }

    /// Open the link with `credential`, replacing any existing one.
    ///
    /// # Returns
    ///
    /// A stream of [`ConnectionState`] transitions
    pub async fn connect(&self, credential: Credential) -> watch::Receiver<ConnectionState> {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(previous) = supervisor.take() {
            tracing::debug!("Tearing down existing connection before reconnecting");
            self.stop_supervisor(previous).await;
        }

        let shared = self.shared.clone();
        *supervisor = Some(tokio::spawn(async move {
            shared.supervise(credential.access_token).await;
        }));
        self.shared.state.subscribe()
    }

    /// Close the link. No automatic retry follows.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.supervisor.lock().await.take() {
            self.stop_supervisor(handle).await;
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Manual reconnect with whatever the credential store holds now.
    pub async fn reconnect(&self) -> Result<watch::Receiver<ConnectionState>, AuthError> {
        let Some(credential) = self.shared.credentials.load().await? else {
            self.shared.set_state(ConnectionState::AuthFailed);
            return Err(AuthError::AuthExpired);
        };
        tracing::info!("Manual reconnect requested");
        Ok(self.connect(credential).await)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    async fn stop_supervisor(&self, handle: JoinHandle<()>) {
        handle.abort();
        // Wait so the aborted task cannot publish after this point.
        let _ = handle.await;
        if self.shared.install_outbound(None).is_some() {
            self.shared
                .signal(LinkSignal::Down(DisconnectReason::ClientClosed));
        }
    }
}

impl RoomCommandSink for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.state().is_connected() && self.shared.has_outbound()
    }

    fn emit(&self, command: RoomCommand) -> Result<(), TransportError> {
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = outbound.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        tracing::debug!("Emitting '{}' for queue '{}'", command.name(), command.queue_id());
        sender
            .send(command)
            .map_err(|_| TransportError::NotConnected)
    }
}

impl Shared {
    async fn supervise(self: Arc<Self>, mut access_token: AccessToken) {
        let mut failures = 0u32;
        let mut refreshed = false;
        self.set_state(ConnectionState::Connecting);

        loop {
            let failure = match self.transport.open(&access_token).await {
                Ok(link) => {
                    failures = 0;
                    refreshed = false;
                    match self.run_link(link).await {
                        LinkEnd::Closed(reason) if reason.is_recoverable() => {
                            Failure::Recoverable(reason.to_string())
                        }
                        LinkEnd::Closed(reason) => {
                            tracing::info!("Connection {}", reason);
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        LinkEnd::Error(message) if is_auth_failure(&message) => {
                            Failure::Auth(message)
                        }
                        LinkEnd::Error(message) => Failure::Recoverable(message),
                    }
                }
                Err(e) if e.is_auth_related() => Failure::Auth(e.to_string()),
                Err(e) => Failure::Recoverable(e.to_string()),
            };

            match failure {
                Failure::Auth(message) => {
                    self.set_state(ConnectionState::AuthFailed);
                    tracing::warn!("Connection rejected credentials: {}", message);
                    if refreshed {
                        tracing::error!("Refreshed credential was rejected as well, giving up");
                        self.signal(LinkSignal::AuthLost);
                        return;
                    }
                    match self.refresher.refresh().await {
                        Ok(token) => {
                            access_token = token;
                            refreshed = true;
                            self.set_state(ConnectionState::Connecting);
                        }
                        Err(e) => {
                            tracing::error!("Cannot recover connection credentials: {}", e);
                            self.signal(LinkSignal::AuthLost);
                            return;
                        }
                    }
                }
                Failure::Recoverable(message) => {
                    failures += 1;
                    if failures > self.policy.max_attempts {
                        tracing::error!(
                            "Failed to reconnect after {} attempts, manual reconnect required",
                            self.policy.max_attempts
                        );
                        self.set_state(ConnectionState::Disconnected);
                        return;
                    }

                    tracing::warn!("Connection lost: {}", message);
                    tracing::info!(
                        "Reconnecting in {:?}... (attempt {}/{})",
                        self.policy.delay,
                        failures,
                        self.policy.max_attempts
                    );
                    self.set_state(ConnectionState::Reconnecting);
                    tokio::time::sleep(self.policy.delay).await;

                    // Pick up a token rotated by the REST path in the meantime.
                    match self.credentials.load().await {
                        Ok(Some(credential)) => access_token = credential.access_token,
                        Ok(None) => {
                            tracing::warn!("Credentials were cleared while reconnecting");
                            self.set_state(ConnectionState::AuthFailed);
                            self.signal(LinkSignal::AuthLost);
                            return;
                        }
                        Err(e) => tracing::warn!("Keeping current token, store unreadable: {}", e),
                    }
                }
            }
        }
    }

    async fn run_link(&self, link: TransportLink) -> LinkEnd {
        let TransportLink {
            outbound,
            mut inbound,
        } = link;
        self.install_outbound(Some(outbound));
        self.set_state(ConnectionState::Connected);
        self.signal(LinkSignal::Up);

        let end = loop {
            match inbound.recv().await {
                Some(TransportSignal::Event(event)) => self.signal(LinkSignal::Event(event)),
                Some(TransportSignal::Error(message)) => break LinkEnd::Error(message),
                Some(TransportSignal::Closed(reason)) => break LinkEnd::Closed(reason),
                None => {
                    break LinkEnd::Closed(DisconnectReason::Network(
                        "transport stopped reporting".to_string(),
                    ));
                }
            }
        };

        // Dropping the sender closes the socket.
        self.install_outbound(None);
        let reason = match &end {
            LinkEnd::Closed(reason) => reason.clone(),
            LinkEnd::Error(message) => DisconnectReason::Network(message.clone()),
        };
        self.signal(LinkSignal::Down(reason));
        end
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!("Connection state {:?} -> {:?}", current, next);
            *current = next;
            true
        });
        if !changed {
            tracing::trace!("Connection state unchanged ({:?})", next);
        }
    }

    fn install_outbound(
        &self,
        sender: Option<mpsc::UnboundedSender<RoomCommand>>,
    ) -> Option<mpsc::UnboundedSender<RoomCommand>> {
        let mut outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *outbound, sender)
    }

    fn has_outbound(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn signal(&self, signal: LinkSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("Session driver is gone, dropping link signal");
        }
    }
}
