//! UseCase: セッション状態（読み取りモデル）
//!
//! The single read-model the session exposes. Writers are the session driver
//! and the command dispatcher; readers subscribe through `watch` channels.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::domain::{
    ActiveToken, ConnectionState, QueueHandle, QueueState, QueueStatus, TokenId,
};

/// Snapshot of everything the UI renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub active_token: Option<ActiveToken>,
    pub queue_status: Option<QueueStatus>,
    pub queue_handle: Option<QueueHandle>,
}

impl SessionSnapshot {
    pub fn queue_state(&self) -> QueueState {
        QueueState {
            active_token: self.active_token.clone(),
            queue_status: self.queue_status.clone(),
        }
    }

    fn anchor(&self) -> QueueAnchor {
        QueueAnchor {
            token: self.active_token.as_ref().map(|token| token.id.clone()),
            handle: self.queue_handle.clone(),
        }
    }
}

/// The token and handle a status poll was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAnchor {
    token: Option<TokenId>,
    handle: Option<QueueHandle>,
}

pub struct SessionStore {
    snapshot: watch::Sender<SessionSnapshot>,
    handle: watch::Sender<Option<QueueHandle>>,
    /// Bumped whenever the session moves on; late REST results compare against it
    epoch: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let (handle, _) = watch::channel(None);
        Self {
            snapshot,
            handle,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Queue handle changes, consumed by the activation watcher
    pub fn subscribe_handle(&self) -> watch::Receiver<Option<QueueHandle>> {
        self.handle.subscribe()
    }

    pub fn set_connection(&self, connection: ConnectionState) {
        self.snapshot.send_if_modified(|current| {
            if current.connection == connection {
                return false;
            }
            current.connection = connection;
            true
        });
    }

    pub fn set_active_token(&self, token: Option<ActiveToken>) {
        self.snapshot.send_if_modified(|current| {
            if current.active_token == token {
                return false;
            }
            current.active_token = token;
            true
        });
    }

    pub fn set_queue_status(&self, status: Option<QueueStatus>) {
        self.snapshot.send_if_modified(|current| {
            if current.queue_status == status {
                return false;
            }
            current.queue_status = status;
            true
        });
    }

    pub fn queue_anchor(&self) -> QueueAnchor {
        self.snapshot.borrow().anchor()
    }

    /// Install a polled status, unless the token or handle it was polled for
    /// has changed since. Returns whether the anchor still held.
    pub fn set_polled_status(&self, anchor: &QueueAnchor, status: QueueStatus) -> bool {
        let mut held = false;
        self.snapshot.send_if_modified(|current| {
            if current.anchor() != *anchor {
                return false;
            }
            held = true;
            if current.queue_status.as_ref() == Some(&status) {
                return false;
            }
            current.queue_status = Some(status);
            true
        });
        held
    }

    /// Install the result of a reconciliation.
    pub fn apply_queue_state(&self, state: QueueState) {
        self.snapshot.send_if_modified(|current| {
            if current.active_token == state.active_token
                && current.queue_status == state.queue_status
            {
                return false;
            }
            current.active_token = state.active_token;
            current.queue_status = state.queue_status;
            true
        });
    }

    pub fn set_handle(&self, handle: Option<QueueHandle>) {
        self.snapshot.send_if_modified(|current| {
            if current.queue_handle == handle {
                return false;
            }
            current.queue_handle = handle.clone();
            true
        });
        self.handle.send_if_modified(|current| {
            if *current == handle {
                return false;
            }
            *current = handle;
            true
        });
    }

    pub fn clear_queue_state(&self) {
        self.apply_queue_state(QueueState::cleared());
    }

    /// Back to an empty, disconnected session.
    pub fn reset(&self) {
        self.snapshot.send_replace(SessionSnapshot::default());
        self.handle.send_replace(None);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}
