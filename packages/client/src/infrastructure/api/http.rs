//! reqwest implementation of the REST ports.
//!
//! Every queue/token call carries the stored access token. A 401 hands over to
//! the shared refresh coordinator and the call is retried once with the token
//! it returns.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    config::SessionConfig,
    domain::{
        AccessToken, ActiveToken, ApiError, AuthApi, ClinicId, Credential, CredentialStore,
        DeviceInfo, Queue, QueueApi, QueueId, QueueStatus, RefreshToken, TokenId,
    },
    infrastructure::dto::http::{
        ApiResponse, GenerateTokenRequest, InitQueueRequest, OneOrMany, QueueDto, QueueStatusDto,
        RefreshTokenRequest, TokenDto, TokenPairDto, UpdateQueueStatusRequest,
    },
    usecase::AuthRefreshCoordinator,
};

/// Shared client honoring the configured request timeout
pub fn build_http_client(config: &SessionConfig) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.device_user_agent.as_str())
        .build()
        .map_err(|e| ApiError::Network(e.to_string()))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn network(error: reqwest::Error) -> ApiError {
    ApiError::Network(error.to_string())
}

/// Unwrap the `{success, data, message}` envelope.
async fn read_data<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ApiError> {
    let status = response.status();
    let body = response.bytes().await.map_err(network)?;

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let message = serde_json::from_slice::<ApiResponse<Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: ApiResponse<T> =
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
    if !envelope.success {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: envelope.message.unwrap_or_default(),
        });
    }
    Ok(envelope.data)
}

fn require<T>(data: Option<T>) -> Result<T, ApiError> {
    data.ok_or_else(|| ApiError::Decode("response carried no data".to_string()))
}

fn into_domain<D, T>(dto: D) -> Result<T, ApiError>
where
    T: TryFrom<D>,
    T::Error: std::fmt::Display,
{
    T::try_from(dto).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `POST /auth/refresh-token`. Sent without a bearer token.
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn refresh(
        &self,
        refresh_token: &RefreshToken,
        device: &DeviceInfo,
    ) -> Result<Credential, ApiError> {
        let request = RefreshTokenRequest {
            refresh_token: refresh_token.as_str().to_string(),
            device_info: device.into(),
        };
        let response = self
            .client
            .post(endpoint(&self.base_url, "/auth/refresh-token"))
            .json(&request)
            .send()
            .await
            .map_err(network)?;
        let pair: TokenPairDto = require(read_data(response).await?)?;
        into_domain(pair)
    }
}

/// Queue and token endpoints
pub struct HttpQueueApi {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    refresher: Arc<AuthRefreshCoordinator>,
}

impl HttpQueueApi {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
        refresher: Arc<AuthRefreshCoordinator>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            credentials,
            refresher,
        }
    }

    async fn access_token(&self) -> Result<AccessToken, ApiError> {
        match self.credentials.load().await {
            Ok(Some(credential)) => Ok(credential.access_token),
            Ok(None) => Err(ApiError::Unauthorized),
            Err(e) => Err(ApiError::Network(format!("credential store: {}", e))),
        }
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &AccessToken,
    ) -> RequestBuilder {
        let builder = self
            .client
            .request(method, endpoint(&self.base_url, path))
            .bearer_auth(token.as_str());
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }

    /// Send with the current token; on 401 refresh once and retry.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, ApiError> {
        let token = self.access_token().await?;
        let response = self
            .request(method.clone(), path, body.as_ref(), &token)
            .send()
            .await
            .map_err(network)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("{} {} answered 401, refreshing credential", method, path);
        let token = self
            .refresher
            .refresh()
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        self.request(method, path, body.as_ref(), &token)
            .send()
            .await
            .map_err(network)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<T>, ApiError> {
        let response = self.execute(method, path, body).await?;
        read_data(response).await
    }

    /// Like `call`, but a 404 is an answer rather than an error.
    async fn find<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        let response = self.execute(Method::GET, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_data(response).await
    }
}

fn json_body<T: Serialize>(body: &T) -> Result<Option<Value>, ApiError> {
    serde_json::to_value(body)
        .map(Some)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl QueueApi for HttpQueueApi {
    async fn today_queue(&self, clinic_id: &ClinicId) -> Result<Option<Queue>, ApiError> {
        let path = format!("/queues/clinic/{}/today", clinic_id);
        self.find::<QueueDto>(&path)
            .await?
            .map(into_domain)
            .transpose()
    }

    async fn queue_status(&self, queue_id: &QueueId) -> Result<QueueStatus, ApiError> {
        let path = format!("/queues/{}/status", queue_id);
        let dto: QueueStatusDto = require(self.call(Method::GET, &path, None).await?)?;
        into_domain(dto)
    }

    async fn set_queue_active(
        &self,
        queue_id: &QueueId,
        is_active: bool,
    ) -> Result<Queue, ApiError> {
        let path = format!("/queues/{}/status", queue_id);
        let body = json_body(&UpdateQueueStatusRequest { is_active })?;
        let dto: QueueDto = require(self.call(Method::PATCH, &path, body).await?)?;
        into_domain(dto)
    }

    async fn initialize_queue(
        &self,
        clinic_id: &ClinicId,
        max_queue_size: u32,
    ) -> Result<Queue, ApiError> {
        let path = format!("/queues/init/{}", clinic_id);
        let body = json_body(&InitQueueRequest { max_queue_size })?;
        let dto: QueueDto = require(self.call(Method::POST, &path, body).await?)?;
        into_domain(dto)
    }

    async fn generate_token(&self, queue_id: &QueueId) -> Result<ActiveToken, ApiError> {
        let body = json_body(&GenerateTokenRequest {
            queue_id: queue_id.as_str().to_string(),
        })?;
        let dto: TokenDto = require(self.call(Method::POST, "/tokens", body).await?)?;
        into_domain(dto)
    }

    async fn cancel_token(&self, token_id: &TokenId) -> Result<(), ApiError> {
        let path = format!("/tokens/{}", token_id);
        self.call::<Value>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn my_active_tokens(&self) -> Result<Vec<ActiveToken>, ApiError> {
        let tokens: Option<OneOrMany<TokenDto>> =
            self.call(Method::GET, "/tokens/my-active", None).await?;
        tokens
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(into_domain)
            .collect()
    }

    async fn token(&self, token_id: &TokenId) -> Result<Option<ActiveToken>, ApiError> {
        let path = format!("/tokens/{}", token_id);
        self.find::<TokenDto>(&path)
            .await?
            .map(into_domain)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        // テスト項目: ベース URL の末尾スラッシュの有無に関わらず正しく結合される
        assert_eq!(
            endpoint("http://localhost:3000/api/", "/tokens"),
            "http://localhost:3000/api/tokens"
        );
        assert_eq!(
            endpoint("http://localhost:3000/api", "/tokens"),
            "http://localhost:3000/api/tokens"
        );
    }

    #[test]
    fn test_build_http_client_with_defaults() {
        // テスト項目: 既定設定で HTTP クライアントを生成できる
        assert!(build_http_client(&SessionConfig::default()).is_ok());
    }
}
