//! Infrastructure layer: adapters behind the domain ports.

pub mod api;
pub mod credential_store;
pub mod dto;
pub mod transport;

use std::sync::Arc;

use qure_shared::time::SystemClock;

use crate::{
    config::SessionConfig,
    domain::{ApiError, CredentialStore},
    usecase::{AuthRefreshCoordinator, QueueSession, SessionDeps},
};

use self::{
    api::{HttpAuthApi, HttpQueueApi, build_http_client},
    transport::WebSocketTransport,
};

/// Wire a session against the real backend.
///
/// The refresh coordinator is shared by the REST adapter and the connection
/// manager, so a 401 and a rejected handshake never refresh twice.
pub fn build_session(
    config: &SessionConfig,
    credentials: Arc<dyn CredentialStore>,
) -> Result<QueueSession, ApiError> {
    let client = build_http_client(config)?;
    let auth_api = Arc::new(HttpAuthApi::new(client.clone(), &config.api_base_url));
    let refresher = Arc::new(AuthRefreshCoordinator::new(
        credentials.clone(),
        auth_api,
        config.device_info(),
    ));
    let queue_api = Arc::new(HttpQueueApi::new(
        client,
        &config.api_base_url,
        credentials.clone(),
        refresher.clone(),
    ));

    Ok(QueueSession::new(
        config,
        SessionDeps {
            credentials,
            refresher,
            queue_api,
            transport: Arc::new(WebSocketTransport::new(&config.ws_url)),
            clock: Arc::new(SystemClock),
        },
    ))
}
