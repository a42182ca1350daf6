//! Event reconciliation.
//!
//! Pure functions that turn `(prior state, inbound event)` into the next state
//! plus the notices to show the user. No I/O happens here, so the whole table
//! can be exercised without a live transport.
//!
//! ## Token lifecycle
//!
//! ```text
//! WAITING --called--> CALLED --completed--> (cleared)
//! WAITING --skipped--> (cleared)
//! any     --queue completed--> (cleared)
//! ```

use std::fmt;

use super::{
    event::{InboundEvent, NoticeKind},
    model::{ActiveToken, QueueStatus, Role, TokenStatus},
    value_object::QueueId,
};

/// The two root pieces of queue state a session holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    pub active_token: Option<ActiveToken>,
    pub queue_status: Option<QueueStatus>,
}

impl QueueState {
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Facts about the session that gate event handling
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    pub role: Role,
    /// Room currently joined on the wire, if any
    pub joined_room: Option<&'a QueueId>,
}

/// Why an event left the state untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NoRoomJoined,
    ForeignQueue { queue_id: QueueId },
    StaleSnapshot { sequence: Option<u64> },
    NoActiveToken,
    ForeignToken,
    NotStaff,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::NoRoomJoined => write!(f, "no room joined"),
            IgnoreReason::ForeignQueue { queue_id } => {
                write!(f, "snapshot for queue '{}' which is not joined", queue_id)
            }
            IgnoreReason::StaleSnapshot { sequence } => {
                write!(f, "stale snapshot (sequence {:?})", sequence)
            }
            IgnoreReason::NoActiveToken => write!(f, "no active token"),
            IgnoreReason::ForeignToken => write!(f, "event is for a different token"),
            IgnoreReason::NotStaff => write!(f, "only staff sessions handle this event"),
        }
    }
}

/// Result of reconciling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied {
        state: QueueState,
        notices: Vec<NoticeKind>,
    },
    Ignored(IgnoreReason),
}

impl Outcome {
    fn applied(state: QueueState, notices: Vec<NoticeKind>) -> Self {
        Outcome::Applied { state, notices }
    }
}

/// Apply one inbound event to the prior state.
pub fn reconcile(prior: &QueueState, event: InboundEvent, ctx: &ReconcileContext<'_>) -> Outcome {
    match event {
        InboundEvent::StatusUpdate(status) => on_status_update(prior, status, ctx),
        InboundEvent::YourTokenCalled(token) => on_token_called(prior, token),
        InboundEvent::YourTokenSkipped(token) => on_token_skipped(prior, token),
        InboundEvent::YourTokenCompleted => {
            Outcome::applied(QueueState::cleared(), vec![NoticeKind::VisitComplete])
        }
        InboundEvent::YourTokenUpdated(token) => on_token_updated(prior, token),
        InboundEvent::QueueEmpty { message } => on_queue_empty(prior, message, ctx),
    }
}

fn on_status_update(prior: &QueueState, status: QueueStatus, ctx: &ReconcileContext<'_>) -> Outcome {
    let Some(joined) = ctx.joined_room else {
        return Outcome::Ignored(IgnoreReason::NoRoomJoined);
    };
    if *joined != status.queue_id {
        return Outcome::Ignored(IgnoreReason::ForeignQueue {
            queue_id: status.queue_id,
        });
    }
    if let Some(held) = &prior.queue_status
        && !status.supersedes(held)
    {
        return Outcome::Ignored(IgnoreReason::StaleSnapshot {
            sequence: status.sequence,
        });
    }

    Outcome::applied(
        QueueState {
            active_token: prior.active_token.clone(),
            queue_status: Some(status),
        },
        Vec::new(),
    )
}

/// Look up the held token an event refers to.
fn held_token<'a>(prior: &'a QueueState, token: &ActiveToken) -> Result<&'a ActiveToken, IgnoreReason> {
    let held = prior
        .active_token
        .as_ref()
        .ok_or(IgnoreReason::NoActiveToken)?;
    if held.id != token.id {
        return Err(IgnoreReason::ForeignToken);
    }
    Ok(held)
}

fn on_token_called(prior: &QueueState, token: ActiveToken) -> Outcome {
    let held = match held_token(prior, &token) {
        Ok(held) => held,
        Err(reason) => return Outcome::Ignored(reason),
    };

    let called = ActiveToken {
        status: TokenStatus::Called,
        ..held.clone()
    };
    let token_number = called.token_number;
    Outcome::applied(
        QueueState {
            active_token: Some(called),
            queue_status: prior.queue_status.clone(),
        },
        vec![NoticeKind::YourTurn { token_number }],
    )
}

fn on_token_skipped(prior: &QueueState, token: ActiveToken) -> Outcome {
    let held = match held_token(prior, &token) {
        Ok(held) => held,
        Err(reason) => return Outcome::Ignored(reason),
    };

    let token_number = held.token_number;
    Outcome::applied(
        QueueState::cleared(),
        vec![NoticeKind::TokenSkipped { token_number }],
    )
}

fn on_token_updated(prior: &QueueState, token: ActiveToken) -> Outcome {
    let held = match held_token(prior, &token) {
        Ok(held) => held,
        Err(reason) => return Outcome::Ignored(reason),
    };

    let updated = ActiveToken {
        token_number: token.token_number,
        ..held.clone()
    };
    Outcome::applied(
        QueueState {
            active_token: Some(updated),
            queue_status: prior.queue_status.clone(),
        },
        vec![NoticeKind::TokenUpdated {
            token_number: token.token_number,
        }],
    )
}

fn on_queue_empty(prior: &QueueState, message: String, ctx: &ReconcileContext<'_>) -> Outcome {
    if ctx.joined_room.is_none() {
        return Outcome::Ignored(IgnoreReason::NoRoomJoined);
    }
    if !ctx.role.is_staff() {
        return Outcome::Ignored(IgnoreReason::NotStaff);
    }
    // Informational only: the state is carried over untouched.
    Outcome::applied(prior.clone(), vec![NoticeKind::QueueEmpty { message }])
}
