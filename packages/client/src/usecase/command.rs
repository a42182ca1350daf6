//! UseCase: コマンド送信（join / leave / callNext / complete）
//!
//! Each verb combines a REST call with a room action and resolves to a typed
//! [`CommandError`] on failure. Double taps are absorbed by per-verb latches.
//! REST results that land after the session moved on are discarded.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::Mutex;

use crate::domain::{
    ActiveToken, ClinicId, Queue, QueueApi, QueueHandle, QueueId, QueueStatus, RoomCommand,
    RoomCommandSink, UserIdentity,
};

use super::{error::CommandError, room_tracker::RoomSubscriptionTracker, store::SessionStore};

/// How a latched command was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The room command went out
    Sent,
    /// The same command was already in flight
    Suppressed,
}

#[derive(Debug, Default)]
struct Latch(AtomicBool);

impl Latch {
    fn try_acquire(&self) -> Option<LatchGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LatchGuard(&self.0))
    }
}

struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Latches {
    joining: Latch,
    calling_next: Latch,
    completing: Latch,
}

/// Command Dispatcher
pub struct CommandDispatcher {
    api: Arc<dyn QueueApi>,
    rooms: Arc<RoomSubscriptionTracker>,
    sink: Arc<dyn RoomCommandSink>,
    store: Arc<SessionStore>,
    identity: UserIdentity,
    completion_refresh_delay: Duration,
    latches: Latches,
    /// Bumped by every leave; a join or resync that started before one must not
    /// install its token. Held while the token and room are committed.
    leaves: Mutex<u64>,
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn QueueApi>,
        rooms: Arc<RoomSubscriptionTracker>,
        sink: Arc<dyn RoomCommandSink>,
        store: Arc<SessionStore>,
        identity: UserIdentity,
        completion_refresh_delay: Duration,
    ) -> Self {
        Self {
            api,
            rooms,
            sink,
            store,
            identity,
            completion_refresh_delay,
            latches: Latches::default(),
            leaves: Mutex::new(0),
        }
    }

    /// Take a token in today's queue of `clinic_id` and subscribe to its room.
    pub async fn join_queue_for_clinic(
        &self,
        clinic_id: &ClinicId,
    ) -> Result<ActiveToken, CommandError> {
        if self.identity.role.is_staff() {
            return Err(CommandError::NotPermitted);
        }
        let Some(_guard) = self.latches.joining.try_acquire() else {
            tracing::debug!("Join already in flight");
            return Err(CommandError::AlreadyQueued);
        };
        if self.store.snapshot().active_token.is_some() {
            return Err(CommandError::AlreadyQueued);
        }

        let epoch = self.store.epoch();
        let leaves = *self.leaves.lock().await;
        let queue = self
            .api
            .today_queue(clinic_id)
            .await?
            .ok_or(CommandError::NoActiveQueue)?;
        if !queue.is_active {
            tracing::info!("Queue '{}' of clinic '{}' is paused", queue.id, clinic_id);
            return Err(CommandError::NoActiveQueue);
        }

        let token = self.api.generate_token(&queue.id).await?;
        self.ensure_epoch(epoch)?;

        let committed = self.leaves.lock().await;
        if *committed != leaves {
            drop(committed);
            tracing::info!("Left while joining, giving back token {}", token.id);
            self.cancel(&token).await;
            return Err(CommandError::JoinCancelled);
        }
        tracing::info!(
            "Joined queue '{}' with token #{} ({})",
            token.queue_id,
            token.token_number,
            token.id
        );
        self.store.set_active_token(Some(token.clone()));
        self.store.set_handle(Some(QueueHandle {
            queue_id: token.queue_id.clone(),
            is_active: true,
        }));
        self.rooms.join(token.queue_id.clone()).await;
        drop(committed);

        self.poll_status(&token.queue_id, epoch).await;
        Ok(token)
    }

    /// Give up the active token, or a join still in flight. Local state clears
    /// before the cancel goes out.
    pub async fn leave_queue(&self) -> Result<(), CommandError> {
        let token = {
            let mut leaves = self.leaves.lock().await;
            *leaves += 1;
            let Some(token) = self.store.snapshot().active_token else {
                tracing::debug!("No active token, nothing to leave");
                return Ok(());
            };
            self.rooms.leave(&token.queue_id).await;
            self.store.clear_queue_state();
            self.store.set_handle(None);
            token
        };
        tracing::info!("Left queue '{}' (token {})", token.queue_id, token.id);

        self.cancel(&token).await;
        Ok(())
    }

    /// Ask the server to call the next waiting token.
    pub async fn call_next(&self) -> Result<Dispatch, CommandError> {
        self.ensure_staff()?;
        let Some(_guard) = self.latches.calling_next.try_acquire() else {
            tracing::debug!("call_next already in flight, suppressed");
            return Ok(Dispatch::Suppressed);
        };
        self.ensure_connected()?;

        let waiting = self
            .store
            .snapshot()
            .queue_status
            .map_or(0, |status| status.waiting_count);
        if waiting == 0 {
            return Err(CommandError::QueueEmpty);
        }

        let handle = self.active_staff_queue().await?;
        self.send(RoomCommand::CallNext(handle.queue_id))?;
        Ok(Dispatch::Sent)
    }

    /// Complete the token currently being served.
    pub async fn complete_current(&self) -> Result<Dispatch, CommandError> {
        self.ensure_staff()?;
        let Some(_guard) = self.latches.completing.try_acquire() else {
            tracing::debug!("complete already in flight, suppressed");
            return Ok(Dispatch::Suppressed);
        };
        self.ensure_connected()?;

        let status = self
            .store
            .snapshot()
            .queue_status
            .filter(QueueStatus::is_serving)
            .ok_or(CommandError::NothingToComplete)?;
        let handle = self.active_staff_queue().await?;

        let epoch = self.store.epoch();
        let serving = self
            .api
            .my_active_tokens()
            .await?
            .into_iter()
            .find(|token| {
                token.queue_id == handle.queue_id
                    && token.token_number == status.current_token_no
                    && !token.status.is_terminal()
            })
            .ok_or(CommandError::NothingToComplete)?;
        self.ensure_epoch(epoch)?;

        self.send(RoomCommand::CompleteToken {
            queue_id: handle.queue_id.clone(),
            token_id: serving.id,
        })?;
        self.schedule_status_refresh(handle.queue_id, epoch);
        Ok(Dispatch::Sent)
    }

    /// Re-derive the queue handle and poll its status.
    pub async fn refresh_queue(&self) -> Result<Option<QueueStatus>, CommandError> {
        let epoch = self.store.epoch();
        let queue_id = if self.identity.role.is_staff() {
            let clinic_id = self.staff_clinic()?;
            let queue = self.api.today_queue(clinic_id).await?;
            self.ensure_epoch(epoch)?;
            let Some(queue) = queue else {
                tracing::info!("No queue today for clinic '{}'", clinic_id);
                self.store.set_handle(None);
                self.store.set_queue_status(None);
                return Ok(None);
            };
            self.store.set_handle(Some(queue.handle()));
            if !queue.is_active {
                return Ok(None);
            }
            queue.id
        } else {
            match self.store.snapshot().active_token {
                Some(token) => token.queue_id,
                None => return Ok(None),
            }
        };

        let anchor = self.store.queue_anchor();
        let status = self.api.queue_status(&queue_id).await?;
        self.ensure_epoch(epoch)?;
        if !self.store.set_polled_status(&anchor, status.clone()) {
            tracing::debug!("Queue state moved on, discarding status of '{}'", queue_id);
            return Ok(None);
        }
        Ok(Some(status))
    }

    /// Re-derive the patient's active token from the server.
    pub async fn refresh_active_token(&self) -> Result<Option<ActiveToken>, CommandError> {
        if self.identity.role.is_staff() {
            return Ok(None);
        }
        let epoch = self.store.epoch();
        let leaves = *self.leaves.lock().await;
        let held = self.store.snapshot().active_token;

        let mut current = match &held {
            Some(token) => self
                .api
                .token(&token.id)
                .await?
                .filter(|token| !token.status.is_terminal()),
            None => None,
        };
        if current.is_none() {
            current = self
                .api
                .my_active_tokens()
                .await?
                .into_iter()
                .find(|token| !token.status.is_terminal());
        }
        self.ensure_epoch(epoch)?;
        let committed = self.leaves.lock().await;
        let local = self.store.snapshot().active_token;
        if local != held || *committed != leaves {
            tracing::debug!("Active token changed locally during refresh, keeping it");
            return Ok(local);
        }

        match &current {
            Some(token) => {
                self.store.set_active_token(Some(token.clone()));
                self.store.set_handle(Some(QueueHandle {
                    queue_id: token.queue_id.clone(),
                    is_active: true,
                }));
                self.rooms.join(token.queue_id.clone()).await;
            }
            None => {
                if let Some(previous) = held {
                    tracing::info!("Token '{}' is no longer active", previous.id);
                    self.rooms.leave(&previous.queue_id).await;
                }
                self.store.clear_queue_state();
                self.store.set_handle(None);
            }
        }
        Ok(current)
    }

    /// Open or pause the staff clinic's queue.
    pub async fn set_queue_active(&self, is_active: bool) -> Result<Queue, CommandError> {
        self.ensure_staff()?;
        let epoch = self.store.epoch();
        let handle = self.staff_queue().await?;
        let queue = self.api.set_queue_active(&handle.queue_id, is_active).await?;
        self.ensure_epoch(epoch)?;
        tracing::info!(
            "Queue '{}' is now {}",
            queue.id,
            if queue.is_active { "open" } else { "paused" }
        );

        self.store.set_handle(Some(queue.handle()));
        if queue.is_active {
            self.poll_status(&queue.id, epoch).await;
        }
        Ok(queue)
    }

    /// Create today's queue for the staff clinic.
    pub async fn initialize_queue(&self, max_queue_size: u32) -> Result<Queue, CommandError> {
        self.ensure_staff()?;
        let epoch = self.store.epoch();
        let clinic_id = self.staff_clinic()?;
        let queue = self.api.initialize_queue(clinic_id, max_queue_size).await?;
        self.ensure_epoch(epoch)?;
        tracing::info!("Initialized queue '{}' (max {})", queue.id, queue.max_queue_size);
        self.store.set_handle(Some(queue.handle()));
        Ok(queue)
    }

    fn ensure_staff(&self) -> Result<(), CommandError> {
        if self.identity.role.is_staff() {
            Ok(())
        } else {
            Err(CommandError::NotPermitted)
        }
    }

    fn ensure_connected(&self) -> Result<(), CommandError> {
        if self.sink.is_connected() {
            Ok(())
        } else {
            Err(CommandError::NotConnected)
        }
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), CommandError> {
        if self.store.epoch() == epoch {
            Ok(())
        } else {
            tracing::debug!("Session moved on, discarding REST result");
            Err(CommandError::SessionEnded)
        }
    }

    fn staff_clinic(&self) -> Result<&ClinicId, CommandError> {
        self.identity
            .clinic_id
            .as_ref()
            .ok_or(CommandError::NoActiveQueue)
    }

    /// The staff clinic's queue, fetched when not known yet
    async fn staff_queue(&self) -> Result<QueueHandle, CommandError> {
        if let Some(handle) = self.store.snapshot().queue_handle {
            return Ok(handle);
        }
        let clinic_id = self.staff_clinic()?;
        let queue = self
            .api
            .today_queue(clinic_id)
            .await?
            .ok_or(CommandError::NoActiveQueue)?;
        let handle = queue.handle();
        self.store.set_handle(Some(handle.clone()));
        Ok(handle)
    }

    async fn active_staff_queue(&self) -> Result<QueueHandle, CommandError> {
        let handle = self.staff_queue().await?;
        if handle.is_active {
            Ok(handle)
        } else {
            Err(CommandError::QueueInactive)
        }
    }

    fn send(&self, command: RoomCommand) -> Result<(), CommandError> {
        let name = command.name();
        self.sink.emit(command).map_err(|e| {
            tracing::warn!("Failed to emit '{}': {}", name, e);
            CommandError::NotConnected
        })?;
        tracing::debug!("Emitted '{}'", name);
        Ok(())
    }

    /// Best-effort `DELETE /tokens/:id`
    async fn cancel(&self, token: &ActiveToken) {
        if let Err(e) = self.api.cancel_token(&token.id).await {
            tracing::warn!("Failed to cancel token '{}': {}", token.id, e);
        }
    }

    /// Best-effort status poll
    async fn poll_status(&self, queue_id: &QueueId, epoch: u64) {
        let anchor = self.store.queue_anchor();
        match self.api.queue_status(queue_id).await {
            Ok(status) if self.store.epoch() == epoch => {
                if !self.store.set_polled_status(&anchor, status) {
                    tracing::debug!("Queue state moved on, discarding status of '{}'", queue_id);
                }
            }
            Ok(_) => tracing::debug!("Session moved on, discarding status of '{}'", queue_id),
            Err(e) => tracing::warn!("Failed to fetch status of '{}': {}", queue_id, e),
        }
    }

    /// The backend settles the completion a little later than it acknowledges it.
    fn schedule_status_refresh(&self, queue_id: QueueId, epoch: u64) {
        let api = self.api.clone();
        let store = self.store.clone();
        let delay = self.completion_refresh_delay;
        let anchor = store.queue_anchor();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match api.queue_status(&queue_id).await {
                Ok(status) if store.epoch() == epoch => {
                    if !store.set_polled_status(&anchor, status) {
                        tracing::debug!("Queue state moved on, discarding status of '{}'", queue_id);
                    }
                }
                Ok(_) => tracing::debug!("Session moved on, discarding status of '{}'", queue_id),
                Err(e) => tracing::warn!("Post-completion refresh of '{}' failed: {}", queue_id, e),
            }
        });
    }
}
