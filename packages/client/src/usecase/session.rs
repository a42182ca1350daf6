//! UseCase: キューセッション（ファサード）
//!
//! Composes the connection manager, the room tracker, the reconciler and the
//! command dispatcher into the one object the application talks to.
//!
//! A driver task consumes link signals in arrival order: `Up` replays the room
//! and resynchronizes over REST, `Event` goes through the reconciler, `AuthLost`
//! ends the session. A refresh that fails on the REST path ends it the same way,
//! with the link torn down as well.

use std::{sync::Arc, time::Duration};

use qure_shared::time::Clock;
use tokio::{
    sync::{Mutex, broadcast, mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    config::SessionConfig,
    domain::{
        ActiveToken, ClinicId, ConnectionState, CredentialStore, InboundEvent, Notice, NoticeKind,
        Outcome, Queue, QueueApi, QueueId, QueueStatus, ReconcileContext, Transport, UserIdentity,
        reconcile,
    },
};

use super::{
    auth_refresh::AuthRefreshCoordinator,
    command::{CommandDispatcher, Dispatch},
    connection::{ConnectionManager, LinkSignal, ReconnectPolicy},
    error::{CommandError, SessionError},
    room_tracker::RoomSubscriptionTracker,
    store::{SessionSnapshot, SessionStore},
};

const NOTICE_CAPACITY: usize = 64;

/// Collaborators a session is built from
pub struct SessionDeps {
    pub credentials: Arc<dyn CredentialStore>,
    /// Shared with the REST layer so both paths use one single-flight guard
    pub refresher: Arc<AuthRefreshCoordinator>,
    pub queue_api: Arc<dyn QueueApi>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
}

struct Running {
    connection: Arc<ConnectionManager>,
    rooms: Arc<RoomSubscriptionTracker>,
    dispatcher: Arc<CommandDispatcher>,
    driver: JoinHandle<()>,
    watcher: Option<JoinHandle<()>>,
}

/// Session Facade
pub struct QueueSession {
    id: Uuid,
    deps: SessionDeps,
    policy: ReconnectPolicy,
    completion_refresh_delay: Duration,
    store: Arc<SessionStore>,
    notices: broadcast::Sender<Notice>,
    running: Mutex<Option<Running>>,
}

impl QueueSession {
    pub fn new(config: &SessionConfig, deps: SessionDeps) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            deps,
            policy: config.reconnect_policy(),
            completion_refresh_delay: config.completion_refresh_delay,
            store: Arc::new(SessionStore::new()),
            notices,
            running: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connect with the stored credential and begin the reconnect/resync loop.
    pub async fn start(
        &self,
        identity: UserIdentity,
    ) -> Result<watch::Receiver<SessionSnapshot>, SessionError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            if !current.driver.is_finished() {
                *running = Some(current);
                return Err(SessionError::AlreadyRunning);
            }
            self.teardown(current).await;
        }

        let credential = self
            .deps
            .credentials
            .load()
            .await?
            .ok_or(SessionError::NotAuthenticated)?;

        self.store.reset();
        self.store.advance_epoch();

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(ConnectionManager::new(
            self.deps.transport.clone(),
            self.deps.refresher.clone(),
            self.deps.credentials.clone(),
            self.policy,
            signal_tx,
        ));
        let rooms = Arc::new(RoomSubscriptionTracker::new(connection.clone()));
        let dispatcher = Arc::new(CommandDispatcher::new(
            self.deps.queue_api.clone(),
            rooms.clone(),
            connection.clone(),
            self.store.clone(),
            identity.clone(),
            self.completion_refresh_delay,
        ));
        let watcher = identity
            .role
            .is_staff()
            .then(|| rooms.watch_handles(self.store.subscribe_handle()));

        let expired = self.deps.refresher.subscribe_expired();
        let states = connection.connect(credential).await;
        let driver = Driver {
            session_id: self.id,
            connection: connection.clone(),
            identity: identity.clone(),
            store: self.store.clone(),
            rooms: rooms.clone(),
            dispatcher: dispatcher.clone(),
            notices: self.notices.clone(),
            clock: self.deps.clock.clone(),
            resync: None,
        };
        let driver = tokio::spawn(driver.run(signal_rx, states, expired));

        tracing::info!(
            "[{}] Session started for '{}' ({:?})",
            self.id,
            identity.user_id,
            identity.role
        );
        *running = Some(Running {
            connection,
            rooms,
            dispatcher,
            driver,
            watcher,
        });
        Ok(self.store.subscribe())
    }

    /// Tear everything down and clear all state.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        self.teardown(running).await;
        tracing::info!("[{}] Session stopped", self.id);
    }

    /// Whether the session is live. A session that lost authentication is not.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.driver.is_finished())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub async fn current_room(&self) -> Option<QueueId> {
        let rooms = self.running.lock().await.as_ref()?.rooms.clone();
        rooms.current_room().await
    }

    /// Manual reconnect after retries were exhausted.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let connection = self
            .running
            .lock()
            .await
            .as_ref()
            .filter(|running| !running.driver.is_finished())
            .map(|running| running.connection.clone())
            .ok_or(SessionError::NotRunning)?;
        connection.reconnect().await?;
        Ok(())
    }

    pub async fn join_queue_for_clinic(
        &self,
        clinic_id: &ClinicId,
    ) -> Result<ActiveToken, CommandError> {
        self.dispatcher()
            .await?
            .join_queue_for_clinic(clinic_id)
            .await
    }

    pub async fn leave_queue(&self) -> Result<(), CommandError> {
        self.dispatcher().await?.leave_queue().await
    }

    pub async fn call_next(&self) -> Result<Dispatch, CommandError> {
        self.dispatcher().await?.call_next().await
    }

    pub async fn complete_current(&self) -> Result<Dispatch, CommandError> {
        self.dispatcher().await?.complete_current().await
    }

    pub async fn refresh_queue(&self) -> Result<Option<QueueStatus>, CommandError> {
        self.dispatcher().await?.refresh_queue().await
    }

    pub async fn refresh_active_token(&self) -> Result<Option<ActiveToken>, CommandError> {
        self.dispatcher().await?.refresh_active_token().await
    }

    pub async fn set_queue_active(&self, is_active: bool) -> Result<Queue, CommandError> {
        self.dispatcher().await?.set_queue_active(is_active).await
    }

    pub async fn initialize_queue(&self, max_queue_size: u32) -> Result<Queue, CommandError> {
        self.dispatcher()
            .await?
            .initialize_queue(max_queue_size)
            .await
    }

    async fn dispatcher(&self) -> Result<Arc<CommandDispatcher>, CommandError> {
        match self.running.lock().await.as_ref() {
            Some(running) if running.driver.is_finished() => Err(CommandError::SessionEnded),
            Some(running) => Ok(running.dispatcher.clone()),
            None => Err(CommandError::NotConnected),
        }
    }

    async fn teardown(&self, running: Running) {
        self.store.advance_epoch();
        running.driver.abort();
        if let Some(watcher) = running.watcher {
            watcher.abort();
        }
        running.connection.disconnect().await;
        running.rooms.reset().await;
        self.store.reset();
    }
}

struct Driver {
    session_id: Uuid,
    connection: Arc<ConnectionManager>,
    identity: UserIdentity,
    store: Arc<SessionStore>,
    rooms: Arc<RoomSubscriptionTracker>,
    dispatcher: Arc<CommandDispatcher>,
    notices: broadcast::Sender<Notice>,
    clock: Arc<dyn Clock>,
    resync: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<LinkSignal>,
        mut states: watch::Receiver<ConnectionState>,
        mut expired: watch::Receiver<u64>,
    ) {
        self.store.set_connection(*states.borrow_and_update());

        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(LinkSignal::Up) => self.on_up().await,
                    Some(LinkSignal::Down(reason)) => {
                        tracing::info!("[{}] Link down: {}", self.session_id, reason);
                        self.rooms.on_disconnected().await;
                    }
                    Some(LinkSignal::Event(event)) => self.on_event(event).await,
                    Some(LinkSignal::AuthLost) => {
                        self.on_auth_lost().await;
                        break;
                    }
                    None => break,
                },
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *states.borrow_and_update();
                    self.store.set_connection(state);
                }
                changed = expired.changed() => {
                    if changed.is_ok() {
                        tracing::warn!("[{}] Credential refresh failed", self.session_id);
                        self.connection.disconnect().await;
                        self.on_auth_lost().await;
                    }
                    break;
                }
            }
        }
    }

    async fn on_up(&mut self) {
        self.rooms.on_connected().await;

        if let Some(previous) = self.resync.take() {
            previous.abort();
        }
        let dispatcher = self.dispatcher.clone();
        let session_id = self.session_id;
        self.resync = Some(tokio::spawn(async move {
            tracing::debug!("[{}] Resynchronizing after connect", session_id);
            if let Err(e) = dispatcher.refresh_active_token().await {
                tracing::warn!("[{}] Failed to refresh active token: {}", session_id, e);
            }
            if let Err(e) = dispatcher.refresh_queue().await {
                tracing::warn!("[{}] Failed to refresh queue: {}", session_id, e);
            }
        }));
    }

    async fn on_event(&self, event: InboundEvent) {
        let name = event.name();
        let joined = self.rooms.current_room().await;
        let ctx = ReconcileContext {
            role: self.identity.role,
            joined_room: joined.as_ref(),
        };
        let prior = self.store.snapshot().queue_state();

        match reconcile(&prior, event, &ctx) {
            Outcome::Applied { state, notices } => {
                let token_cleared = prior.active_token.is_some() && state.active_token.is_none();
                self.store.apply_queue_state(state);
                if token_cleared && !self.identity.role.is_staff() {
                    if let Some(room) = joined {
                        self.rooms.leave(&room).await;
                    }
                    self.store.set_handle(None);
                }
                for kind in notices {
                    self.publish(kind);
                }
            }
            Outcome::Ignored(reason) => {
                tracing::debug!("[{}] Dropped '{}': {}", self.session_id, name, reason);
            }
        }
    }

    async fn on_auth_lost(&self) {
        tracing::error!("[{}] Authentication lost, ending session", self.session_id);
        self.store.advance_epoch();
        self.rooms.reset().await;
        self.store.clear_queue_state();
        self.store.set_handle(None);
        self.store.set_connection(ConnectionState::AuthFailed);
        self.publish(NoticeKind::SessionExpired);
    }

    fn publish(&self, kind: NoticeKind) {
        let notice = Notice::new(kind, self.clock.now_millis());
        tracing::info!("[{}] Notice: {:?}", self.session_id, notice.kind);
        if self.notices.send(notice).is_err() {
            tracing::trace!("No notice subscribers");
        }
    }
}

// Aborting the driver task drops it; the resync must not outlive it.
impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(resync) = self.resync.take() {
            resync.abort();
        }
    }
}
