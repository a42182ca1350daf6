//! WebSocket を使った Transport 実装
//!
//! ## 責務
//!
//! - Bearer トークン付きでハンドシェイクする
//! - 送信コマンドを JSON フレームにエンコードし、受信フレームをデコードする
//! - 切断理由を `TransportSignal::Closed` として報告する
//!
//! One pump task per link owns the socket. Dropping the link's outbound
//! sender makes the pump send a Close frame and exit.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Error as WsError,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message,
    },
};

use crate::{
    domain::{
        AccessToken, DisconnectReason, RoomCommand, Transport, TransportError, TransportLink,
        TransportSignal,
    },
    infrastructure::dto::conversion::{InboundFrame, decode_frame, encode_command},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, access_token: &AccessToken) -> Result<TransportLink, TransportError> {
        let request = handshake_request(&self.url, access_token)?;
        let (socket, _response) = connect_async(request).await.map_err(handshake_error)?;
        tracing::info!("WebSocket connected to {}", self.url);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(socket, outbound_rx, inbound_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

fn handshake_request(url: &str, access_token: &AccessToken) -> Result<Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Io(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token.as_str()))
        .map_err(|e| TransportError::Io(format!("bad handshake header: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

fn handshake_error(error: WsError) -> TransportError {
    match error {
        WsError::Http(response) => {
            TransportError::Handshake(format!("HTTP {}", response.status().as_u16()))
        }
        other => TransportError::Io(other.to_string()),
    }
}

async fn pump(
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<RoomCommand>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    let (mut write, mut read) = socket.split();

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    let name = command.name();
                    let text = match encode_command(command) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Failed to encode '{}': {}", name, e);
                            continue;
                        }
                    };
                    tracing::debug!("-> {}", text);
                    if let Err(e) = write.send(Message::text(text)).await {
                        break DisconnectReason::Network(e.to_string());
                    }
                }
                None => {
                    tracing::debug!("Link released, closing WebSocket");
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("<- {}", text.as_str());
                    match decode_frame(text.as_str()) {
                        Ok(Some(InboundFrame::Event(event))) => {
                            let _ = signals.send(TransportSignal::Event(event));
                        }
                        Ok(Some(InboundFrame::ConnectError(message))) => {
                            let _ = signals.send(TransportSignal::Error(message));
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                        Ok(None) => tracing::debug!("Ignoring unknown event"),
                        Err(e) => tracing::warn!("Dropping frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break DisconnectReason::ServerClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break DisconnectReason::Network(e.to_string()),
            },
        }
    };

    tracing::info!("WebSocket {}", reason);
    let _ = signals.send(TransportSignal::Closed(reason));
}
