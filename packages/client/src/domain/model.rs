//! Domain models held by a queue session.

use serde::{Deserialize, Serialize};

use super::value_object::{AccessToken, ClinicId, QueueId, RefreshToken, TokenId, UserId};

/// Role of the signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Patient,
    Staff,
    Admin,
}

impl Role {
    /// Staff and admins operate a clinic's queue; patients hold tokens.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// Who the session belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub role: Role,
    /// Clinic the staff member works at. Always `None` for patients.
    pub clinic_id: Option<ClinicId>,
}

impl UserIdentity {
    pub fn patient(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Patient,
            clinic_id: None,
        }
    }

    pub fn staff(user_id: UserId, clinic_id: ClinicId) -> Self {
        Self {
            user_id,
            role: Role::Staff,
            clinic_id: Some(clinic_id),
        }
    }
}

/// Access + refresh credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

impl Credential {
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }
}

/// Device description sent along with a refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_agent: String,
}

/// Lifecycle of the single realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    AuthFailed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// The room a session wants to be subscribed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub queue_id: QueueId,
    pub is_active: bool,
}

/// A clinic's daily queue as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    pub id: QueueId,
    pub clinic_id: ClinicId,
    pub current_token_no: u32,
    pub max_queue_size: u32,
    pub is_active: bool,
}

impl Queue {
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            queue_id: self.id.clone(),
            is_active: self.is_active,
        }
    }
}

/// Status of a patient's token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Waiting,
    Called,
    InProgress,
    Completed,
    Skipped,
}

impl TokenStatus {
    /// Completed and skipped tokens are never held as the active token.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Skipped)
    }
}

/// The patient's reserved place in a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveToken {
    pub id: TokenId,
    pub queue_id: QueueId,
    pub token_number: u32,
    pub status: TokenStatus,
}

/// Server-authoritative snapshot of a queue. Only ever replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub queue_id: QueueId,
    pub current_token_no: u32,
    pub waiting_count: u32,
    /// `None` on backends that predate served-number tracking.
    pub last_served_token_number: Option<u32>,
    /// Minutes
    pub estimated_wait_time: Option<u32>,
    /// Monotonic per-queue counter, when the backend provides one.
    pub sequence: Option<u64>,
}

impl QueueStatus {
    /// Whether a token is currently being served and can be completed.
    pub fn is_serving(&self) -> bool {
        match self.last_served_token_number {
            Some(last_served) => self.current_token_no > last_served,
            None => self.current_token_no > 0,
        }
    }

    /// Whether this snapshot may replace `held`.
    ///
    /// Only a sequence regression on the same queue is rejected; anything else
    /// falls back to last-write-wins by arrival.
    pub fn supersedes(&self, held: &QueueStatus) -> bool {
        if self.queue_id != held.queue_id {
            return true;
        }
        match (self.sequence, held.sequence) {
            (Some(incoming), Some(current)) => incoming > current,
            _ => true,
        }
    }
}
