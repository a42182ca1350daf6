//! REST ports consumed by the session.
//!
//! The backend owns queue scheduling; these traits describe only the calls the
//! session makes against it.

use async_trait::async_trait;

use super::{
    error::ApiError,
    model::{ActiveToken, Credential, DeviceInfo, Queue, QueueStatus},
    value_object::{ClinicId, QueueId, RefreshToken, TokenId},
};

/// `POST /auth/refresh-token`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn refresh(
        &self,
        refresh_token: &RefreshToken,
        device: &DeviceInfo,
    ) -> Result<Credential, ApiError>;
}

/// Queue and token endpoints
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// `GET /queues/clinic/:clinicId/today`; `None` when the clinic has no queue today
    async fn today_queue(&self, clinic_id: &ClinicId) -> Result<Option<Queue>, ApiError>;

    /// `GET /queues/:queueId/status`
    async fn queue_status(&self, queue_id: &QueueId) -> Result<QueueStatus, ApiError>;

    /// `PATCH /queues/:queueId/status`
    async fn set_queue_active(&self, queue_id: &QueueId, is_active: bool)
    -> Result<Queue, ApiError>;

    /// `POST /queues/init/:clinicId`
    async fn initialize_queue(
        &self,
        clinic_id: &ClinicId,
        max_queue_size: u32,
    ) -> Result<Queue, ApiError>;

    /// `POST /tokens`
    async fn generate_token(&self, queue_id: &QueueId) -> Result<ActiveToken, ApiError>;

    /// `DELETE /tokens/:id`
    async fn cancel_token(&self, token_id: &TokenId) -> Result<(), ApiError>;

    /// `GET /tokens/my-active`. Staff sessions get the token currently being served.
    async fn my_active_tokens(&self) -> Result<Vec<ActiveToken>, ApiError>;

    /// `GET /tokens/:id`
    async fn token(&self, token_id: &TokenId) -> Result<Option<ActiveToken>, ApiError>;
}
