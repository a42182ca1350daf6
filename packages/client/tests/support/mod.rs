//! In-process fake backend for the session integration tests.
//!
//! Serves the REST endpoints the session calls plus the realtime endpoint, on
//! an ephemeral port. Every request is authorized against one valid access
//! token; `POST /auth/refresh-token` issues a new one.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde_json::{Value, json};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use qure_client::{
    SessionConfig,
    domain::{AccessToken, Credential, RefreshToken},
};

pub const CLINIC_ID: &str = "clinicA";
pub const QUEUE_ID: &str = "q1";
pub const TOKEN_ID: &str = "t1";
pub const TOKEN_NUMBER: u32 = 7;

#[derive(Default)]
struct BackendState {
    valid_token: Mutex<String>,
    refresh_calls: AtomicUsize,
    handshakes: AtomicUsize,
    active_token: Mutex<Option<Value>>,
    cancelled: Mutex<Vec<String>>,
    frames: Mutex<Vec<Value>>,
    client: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl BackendState {
    async fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock().await);
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == expected)
    }
}

/// Helper struct to manage the fake backend lifecycle
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend that accepts `valid_token`
    pub async fn start(valid_token: &str) -> Self {
        let state = Arc::new(BackendState {
            valid_token: Mutex::new(valid_token.to_string()),
            ..BackendState::default()
        });

        let app = Router::new()
            .route("/ws", get(websocket_handler))
            .route("/api/auth/refresh-token", post(refresh_token))
            .route("/api/queues/clinic/{clinic_id}/today", get(today_queue))
            .route("/api/queues/{queue_id}/status", get(queue_status))
            .route("/api/tokens", post(generate_token))
            .route("/api/tokens/my-active", get(my_active))
            .route("/api/tokens/{token_id}", get(token).delete(cancel_token))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake backend failed");
        });

        FakeBackend {
            addr,
            state,
            server,
        }
    }

    /// Session configuration pointing at this backend
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            api_base_url: format!("http://{}/api", self.addr),
            ws_url: format!("ws://{}/ws", self.addr),
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(50),
            completion_refresh_delay: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// Invalidate the current access token without issuing a new one
    pub async fn revoke_access_token(&self) {
        *self.state.valid_token.lock().await = "revoked".to_string();
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.state.cancelled.lock().await.clone()
    }

    /// Push one event frame to the connected client
    pub async fn push(&self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        let client = self.state.client.lock().await;
        client
            .as_ref()
            .expect("No client connected")
            .send(frame)
            .expect("Client socket gone");
    }

    /// Wait until the client has sent a frame with this event name
    pub async fn wait_for_frame(&self, event: &str) -> Value {
        within(async {
            loop {
                let found = self
                    .state
                    .frames
                    .lock()
                    .await
                    .iter()
                    .find(|frame| frame["event"] == event)
                    .cloned();
                if let Some(frame) = found {
                    return frame;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
    }

    pub async fn frames(&self, event: &str) -> Vec<Value> {
        self.state
            .frames
            .lock()
            .await
            .iter()
            .filter(|frame| frame["event"] == event)
            .cloned()
            .collect()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn credential(access: &str, refresh: &str) -> Credential {
    Credential::new(
        AccessToken::new(access).unwrap(),
        RefreshToken::new(refresh).unwrap(),
    )
}

pub fn token_json(status: &str) -> Value {
    json!({
        "id": TOKEN_ID,
        "queueId": QUEUE_ID,
        "tokenNumber": TOKEN_NUMBER,
        "status": status,
    })
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

fn ok(data: Value) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "message": "Unauthorized" })),
    )
        .into_response()
}

// ========================================
// Handlers
// ========================================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Response {
    state.handshakes.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let (tx, rx) = mpsc::unbounded_channel();
    *state.client.lock().await = Some(tx);
    ws.on_upgrade(move |socket| handle_socket(socket, state, rx))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<BackendState>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                        recv_state.frames.lock().await.push(frame);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn refresh_token(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Response {
    if body["refreshToken"].as_str().is_none() || body["deviceInfo"]["userAgent"].is_null() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "success": false }))).into_response();
    }
    let issued = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let access = format!("access-renewed-{}", issued);
    *state.valid_token.lock().await = access.clone();
    ok(json!({
        "accessToken": access,
        "refreshToken": format!("refresh-renewed-{}", issued),
    }))
}

async fn today_queue(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(clinic_id): Path<String>,
) -> Response {
    if !state.authorized(&headers).await {
        return unauthorized();
    }
    if clinic_id != CLINIC_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Queue not found" })),
        )
            .into_response();
    }
    ok(json!({
        "id": QUEUE_ID,
        "clinicId": CLINIC_ID,
        "currentTokenNo": 3,
        "maxQueueSize": 50,
        "isActive": true,
    }))
}

async fn queue_status(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(queue_id): Path<String>,
) -> Response {
    if !state.authorized(&headers).await {
        return unauthorized();
    }
    ok(json!({
        "queueId": queue_id,
        "currentTokenNo": 3,
        "waitingCount": 4,
        "estimatedWaitTime": 20,
    }))
}

async fn generate_token(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers).await {
        return unauthorized();
    }
    if body["queueId"] != QUEUE_ID {
        return (StatusCode::BAD_REQUEST, Json(json!({ "success": false }))).into_response();
    }
    let token = token_json("WAITING");
    *state.active_token.lock().await = Some(token.clone());
    ok(token)
}

async fn my_active(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers).await {
        return unauthorized();
    }
    let token = state.active_token.lock().await.clone();
    ok(token.unwrap_or(Value::Null))
}

async fn token(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(token_id): Path<String>,
) -> Response {
    if !state.authorized(&headers).await {
        return unauthorized();
    }
    match state.active_token.lock().await.clone() {
        Some(token) if token["id"] == token_id.as_str() => ok(token),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Token not found" })),
        )
            .into_response(),
    }
}

async fn cancel_token(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(token_id): Path<String>,
) -> Response {
    if !state.authorized(&headers).await {
        return unauthorized();
    }
    state.cancelled.lock().await.push(token_id);
    *state.active_token.lock().await = None;
    ok(Value::Null)
}
