//! Messages exchanged over the realtime link, and the notices they produce.

use super::{
    model::{ActiveToken, QueueStatus},
    value_object::{QueueId, TokenId},
};

/// Server → client queue events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `queue:status_update`
    StatusUpdate(QueueStatus),
    /// `queue:your_token_called`
    YourTokenCalled(ActiveToken),
    /// `queue:your_token_skipped`
    YourTokenSkipped(ActiveToken),
    /// `queue:your_token_completed`
    YourTokenCompleted,
    /// `queue:your_token_updated`
    YourTokenUpdated(ActiveToken),
    /// `queue:empty`
    QueueEmpty { message: String },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::StatusUpdate(_) => "queue:status_update",
            InboundEvent::YourTokenCalled(_) => "queue:your_token_called",
            InboundEvent::YourTokenSkipped(_) => "queue:your_token_skipped",
            InboundEvent::YourTokenCompleted => "queue:your_token_completed",
            InboundEvent::YourTokenUpdated(_) => "queue:your_token_updated",
            InboundEvent::QueueEmpty { .. } => "queue:empty",
        }
    }
}

/// Client → server room commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCommand {
    JoinQueue(QueueId),
    LeaveQueue(QueueId),
    CallNext(QueueId),
    CompleteToken { queue_id: QueueId, token_id: TokenId },
}

impl RoomCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RoomCommand::JoinQueue(_) => "join-queue",
            RoomCommand::LeaveQueue(_) => "leave-queue",
            RoomCommand::CallNext(_) => "queue:call_next",
            RoomCommand::CompleteToken { .. } => "queue:complete_token",
        }
    }

    pub fn queue_id(&self) -> &QueueId {
        match self {
            RoomCommand::JoinQueue(queue_id)
            | RoomCommand::LeaveQueue(queue_id)
            | RoomCommand::CallNext(queue_id)
            | RoomCommand::CompleteToken { queue_id, .. } => queue_id,
        }
    }
}

/// User-facing notice produced by reconciliation or session lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    YourTurn { token_number: u32 },
    TokenSkipped { token_number: u32 },
    VisitComplete,
    TokenUpdated { token_number: u32 },
    QueueEmpty { message: String },
    /// Refresh failed; the application must sign the user out.
    SessionExpired,
}

impl NoticeKind {
    /// Being called is the only notice that also buzzes the device.
    pub fn wants_haptic(&self) -> bool {
        matches!(self, NoticeKind::YourTurn { .. })
    }
}

/// A notice stamped with the time it was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub haptic: bool,
    /// Unix timestamp (milliseconds)
    pub raised_at: i64,
}

impl Notice {
    pub fn new(kind: NoticeKind, raised_at: i64) -> Self {
        Self {
            haptic: kind.wants_haptic(),
            kind,
            raised_at,
        }
    }
}
