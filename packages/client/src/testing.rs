//! Test doubles shared by the unit tests.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

use crate::domain::{
    AccessToken, ActiveToken, ApiError, AuthApi, ClinicId, Credential, DeviceInfo,
    DisconnectReason, InboundEvent, MockQueueApi, Queue, QueueApi, QueueId, QueueStatus,
    RefreshToken, RoomCommand, RoomCommandSink, TokenId, TokenStatus, Transport, TransportError,
    TransportLink, TransportSignal,
};

pub fn credential(access: &str, refresh: &str) -> Credential {
    Credential::new(
        AccessToken::new(access).unwrap(),
        RefreshToken::new(refresh).unwrap(),
    )
}

pub fn device() -> DeviceInfo {
    DeviceInfo {
        user_agent: "QureClinics-Mobile-App".to_string(),
    }
}

pub fn active_token(id: &str, queue_id: &str, token_number: u32, status: TokenStatus) -> ActiveToken {
    ActiveToken {
        id: TokenId::new(id).unwrap(),
        queue_id: QueueId::new(queue_id).unwrap(),
        token_number,
        status,
    }
}

/// Fail the test instead of hanging forever.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

/// Refresh endpoint that blocks until the test opens the gate.
pub struct GatedAuthApi {
    renewed: Credential,
    gate: watch::Sender<bool>,
    calls: AtomicUsize,
}

impl GatedAuthApi {
    pub fn new(renewed: Credential) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            renewed,
            gate,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, expected: usize) {
        within(async {
            while self.calls() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }
}

#[async_trait]
impl AuthApi for GatedAuthApi {
    async fn refresh(
        &self,
        _refresh_token: &RefreshToken,
        _device: &DeviceInfo,
    ) -> Result<Credential, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(self.renewed.clone())
    }
}

/// Queue endpoint held back by [`GatedQueueApi`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePoint {
    TodayQueue,
    GenerateToken,
}

/// Queue API that answers from a mock but blocks one endpoint until the test
/// opens the gate.
pub struct GatedQueueApi {
    inner: MockQueueApi,
    point: GatePoint,
    gate: watch::Sender<bool>,
    calls: AtomicUsize,
}

impl GatedQueueApi {
    pub fn new(inner: MockQueueApi, point: GatePoint) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner,
            point,
            gate,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Calls that reached the gated endpoint
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, expected: usize) {
        within(async {
            while self.calls() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }

    async fn pass(&self, point: GatePoint) -> Result<(), ApiError> {
        if point != self.point {
            return Ok(());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|e| ApiError::Network(e.to_string()))
    }
}

#[async_trait]
impl QueueApi for GatedQueueApi {
    async fn today_queue(&self, clinic_id: &ClinicId) -> Result<Option<Queue>, ApiError> {
        self.pass(GatePoint::TodayQueue).await?;
        self.inner.today_queue(clinic_id).await
    }

    async fn queue_status(&self, queue_id: &QueueId) -> Result<QueueStatus, ApiError> {
        self.inner.queue_status(queue_id).await
    }

    async fn set_queue_active(
        &self,
        queue_id: &QueueId,
        is_active: bool,
    ) -> Result<Queue, ApiError> {
        self.inner.set_queue_active(queue_id, is_active).await
    }

    async fn initialize_queue(
        &self,
        clinic_id: &ClinicId,
        max_queue_size: u32,
    ) -> Result<Queue, ApiError> {
        self.inner.initialize_queue(clinic_id, max_queue_size).await
    }

    async fn generate_token(&self, queue_id: &QueueId) -> Result<ActiveToken, ApiError> {
        self.pass(GatePoint::GenerateToken).await?;
        self.inner.generate_token(queue_id).await
    }

    async fn cancel_token(&self, token_id: &TokenId) -> Result<(), ApiError> {
        self.inner.cancel_token(token_id).await
    }

    async fn my_active_tokens(&self) -> Result<Vec<ActiveToken>, ApiError> {
        self.inner.my_active_tokens().await
    }

    async fn token(&self, token_id: &TokenId) -> Result<Option<ActiveToken>, ApiError> {
        self.inner.token(token_id).await
    }
}

/// What the next `open` call does
pub enum Scripted {
    Accept,
    Reject(TransportError),
}

/// Server side of an accepted fake link
pub struct FakeLink {
    pub outbound: mpsc::UnboundedReceiver<RoomCommand>,
    inbound: mpsc::UnboundedSender<TransportSignal>,
}

impl FakeLink {
    pub fn push_event(&self, event: InboundEvent) {
        let _ = self.inbound.send(TransportSignal::Event(event));
    }

    pub fn push_error(&self, message: &str) {
        let _ = self.inbound.send(TransportSignal::Error(message.to_string()));
    }

    pub fn close(&self, reason: DisconnectReason) {
        let _ = self.inbound.send(TransportSignal::Closed(reason));
    }
}

/// Transport that follows a script of accepts and rejections.
pub struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    opened_with: Mutex<Vec<String>>,
    links_tx: mpsc::UnboundedSender<FakeLink>,
    links_rx: AsyncMutex<mpsc::UnboundedReceiver<FakeLink>>,
}

impl FakeTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(script.into()),
            opened_with: Mutex::new(Vec::new()),
            links_tx,
            links_rx: AsyncMutex::new(links_rx),
        }
    }

    /// Access tokens presented to `open`, in order
    pub fn opened_with(&self) -> Vec<String> {
        self.opened_with.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened_with.lock().unwrap().len()
    }

    /// Next accepted link
    pub async fn next_link(&self) -> FakeLink {
        within(self.links_rx.lock().await.recv())
            .await
            .expect("transport dropped")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, access_token: &AccessToken) -> Result<TransportLink, TransportError> {
        self.opened_with
            .lock()
            .unwrap()
            .push(access_token.as_str().to_string());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::Reject(TransportError::Io("script exhausted".to_string())));

        match step {
            Scripted::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let _ = self.links_tx.send(FakeLink {
                    outbound: outbound_rx,
                    inbound: inbound_tx,
                });
                Ok(TransportLink {
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                })
            }
            Scripted::Reject(error) => Err(error),
        }
    }
}

/// Sink that records what would have been sent.
pub struct RecordingSink {
    connected: AtomicBool,
    commands: Mutex<Vec<RoomCommand>>,
}

impl RecordingSink {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<RoomCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub async fn wait_for_len(&self, expected: usize) {
        while self.commands.lock().unwrap().len() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl RoomCommandSink for RecordingSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, command: RoomCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}
