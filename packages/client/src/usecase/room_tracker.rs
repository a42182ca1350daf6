//! UseCase: ルーム購読管理
//!
//! Sole owner of the room subscription. Manual commands and the queue-activation
//! watcher both funnel through here, so the session never holds more than one
//! joined room.
//!
//! A join requested while offline is kept as the target and replayed once the
//! link comes up; a leave for a room that is not the target is a no-op.

use std::sync::Arc;

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};

use crate::domain::{QueueHandle, QueueId, RoomCommand, RoomCommandSink};

#[derive(Debug, Default)]
struct RoomState {
    /// Room the session wants to be in
    target: Option<QueueId>,
    /// Whether `target` has been joined on the current link
    joined: bool,
}

/// Room Subscription Tracker
pub struct RoomSubscriptionTracker {
    sink: Arc<dyn RoomCommandSink>,
    state: Mutex<RoomState>,
}

impl RoomSubscriptionTracker {
    pub fn new(sink: Arc<dyn RoomCommandSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(RoomState::default()),
        }
    }

    /// Subscribe to `queue_id`, superseding any previous room.
    pub async fn join(&self, queue_id: QueueId) {
        let mut room = self.state.lock().await;
        if room.target.as_ref() == Some(&queue_id) && room.joined {
            tracing::trace!("Room '{}' already joined", queue_id);
            return;
        }

        if let Some(previous) = room.target.take()
            && previous != queue_id
            && room.joined
        {
            tracing::debug!("Room '{}' superseded by '{}'", previous, queue_id);
            self.send(RoomCommand::LeaveQueue(previous));
        }

        room.target = Some(queue_id.clone());
        room.joined = false;
        if self.sink.is_connected() {
            room.joined = self.send(RoomCommand::JoinQueue(queue_id));
        } else {
            tracing::debug!("Offline, room '{}' will be joined once connected", queue_id);
        }
    }

    /// Unsubscribe from `queue_id`. Idempotent.
    pub async fn leave(&self, queue_id: &QueueId) {
        let mut room = self.state.lock().await;
        if room.target.as_ref() != Some(queue_id) {
            tracing::trace!("Not in room '{}', nothing to leave", queue_id);
            return;
        }

        if room.joined {
            self.send(RoomCommand::LeaveQueue(queue_id.clone()));
        }
        room.target = None;
        room.joined = false;
    }

    /// Room joined on the current link
    pub async fn current_room(&self) -> Option<QueueId> {
        let room = self.state.lock().await;
        room.target.clone().filter(|_| room.joined)
    }

    /// Room waiting for the link to come up
    pub async fn pending_room(&self) -> Option<QueueId> {
        let room = self.state.lock().await;
        room.target.clone().filter(|_| !room.joined)
    }

    /// Replay the target room on a fresh link.
    pub async fn on_connected(&self) {
        let mut room = self.state.lock().await;
        if room.joined {
            return;
        }
        if let Some(queue_id) = room.target.clone() {
            tracing::info!("Rejoining room '{}' after connect", queue_id);
            room.joined = self.send(RoomCommand::JoinQueue(queue_id));
        }
    }

    /// The link is gone; the server forgot our subscription with it.
    pub async fn on_disconnected(&self) {
        self.state.lock().await.joined = false;
    }

    /// Forget everything without emitting anything.
    pub async fn reset(&self) {
        *self.state.lock().await = RoomState::default();
    }

    /// Join an active queue, leave a paused one.
    pub async fn apply_handle(&self, handle: Option<&QueueHandle>) {
        match handle {
            Some(handle) if handle.is_active => self.join(handle.queue_id.clone()).await,
            Some(handle) => {
                tracing::info!("Queue '{}' is paused, not subscribing", handle.queue_id);
                self.leave(&handle.queue_id).await;
            }
            None => {
                let target = self.state.lock().await.target.clone();
                if let Some(queue_id) = target {
                    self.leave(&queue_id).await;
                }
            }
        }
    }

    /// Re-evaluate the subscription whenever the queue handle changes.
    pub fn watch_handles(
        self: &Arc<Self>,
        mut handles: watch::Receiver<Option<QueueHandle>>,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            loop {
                let handle = handles.borrow_and_update().clone();
                tracker.apply_handle(handle.as_ref()).await;
                if handles.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn send(&self, command: RoomCommand) -> bool {
        let name = command.name();
        match self.sink.emit(command) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to emit '{}': {}", name, e);
                false
            }
        }
    }
}
