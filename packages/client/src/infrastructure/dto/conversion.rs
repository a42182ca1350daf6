//! Conversion logic between DTOs and domain models, plus frame (de)coding.

use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    AccessToken, ActiveToken, ClinicId, Credential, DeviceInfo, InboundEvent, Queue, QueueId,
    QueueStatus, RefreshToken, RoomCommand, TokenId, ValueObjectError,
};
use crate::infrastructure::dto::{http, websocket as ws};

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<http::TokenPairDto> for Credential {
    type Error = ValueObjectError;

    fn try_from(dto: http::TokenPairDto) -> Result<Self, Self::Error> {
        Ok(Credential::new(
            AccessToken::new(dto.access_token)?,
            RefreshToken::new(dto.refresh_token)?,
        ))
    }
}

impl TryFrom<http::QueueDto> for Queue {
    type Error = ValueObjectError;

    fn try_from(dto: http::QueueDto) -> Result<Self, Self::Error> {
        Ok(Queue {
            id: QueueId::new(dto.id)?,
            clinic_id: ClinicId::new(dto.clinic_id)?,
            current_token_no: dto.current_token_no,
            max_queue_size: dto.max_queue_size,
            is_active: dto.is_active,
        })
    }
}

impl TryFrom<http::QueueStatusDto> for QueueStatus {
    type Error = ValueObjectError;

    fn try_from(dto: http::QueueStatusDto) -> Result<Self, Self::Error> {
        Ok(QueueStatus {
            queue_id: QueueId::new(dto.queue_id)?,
            current_token_no: dto.current_token_no,
            waiting_count: dto.waiting_count,
            last_served_token_number: dto.last_served_token_number,
            estimated_wait_time: dto.estimated_wait_time,
            sequence: dto.sequence,
        })
    }
}

impl TryFrom<http::TokenDto> for ActiveToken {
    type Error = ValueObjectError;

    fn try_from(dto: http::TokenDto) -> Result<Self, Self::Error> {
        Ok(ActiveToken {
            id: TokenId::new(dto.id)?,
            queue_id: QueueId::new(dto.queue_id)?,
            token_number: dto.token_number,
            status: dto.status,
        })
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<&DeviceInfo> for http::DeviceInfoDto {
    fn from(model: &DeviceInfo) -> Self {
        Self {
            user_agent: model.user_agent.clone(),
        }
    }
}

impl TryFrom<RoomCommand> for ws::Envelope {
    type Error = serde_json::Error;

    fn try_from(command: RoomCommand) -> Result<Self, Self::Error> {
        let event = command.name().to_string();
        let data = match command {
            RoomCommand::JoinQueue(queue_id)
            | RoomCommand::LeaveQueue(queue_id)
            | RoomCommand::CallNext(queue_id) => Value::String(queue_id.into_string()),
            RoomCommand::CompleteToken { queue_id, token_id } => {
                serde_json::to_value(ws::CompleteTokenPayload {
                    queue_id: queue_id.into_string(),
                    token_id: token_id.into_string(),
                })?
            }
        };
        Ok(Self { event, data })
    }
}

// ========================================
// Frames
// ========================================

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Event(InboundEvent),
    /// Server-side rejection of the link, usually authentication
    ConnectError(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Invalid payload for '{event}': {message}")]
    Payload { event: String, message: String },
}

/// Decode one text frame. Unknown events decode to `None`.
pub fn decode_frame(text: &str) -> Result<Option<InboundFrame>, FrameError> {
    let envelope: ws::Envelope =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
    let ws::Envelope { event, data } = envelope;

    let frame = match event.as_str() {
        ws::STATUS_UPDATE => {
            let dto: http::QueueStatusDto = payload(&event, data)?;
            InboundFrame::Event(InboundEvent::StatusUpdate(domain(&event, dto)?))
        }
        ws::YOUR_TOKEN_CALLED => {
            InboundFrame::Event(InboundEvent::YourTokenCalled(token(&event, data)?))
        }
        ws::YOUR_TOKEN_SKIPPED => {
            InboundFrame::Event(InboundEvent::YourTokenSkipped(token(&event, data)?))
        }
        ws::YOUR_TOKEN_UPDATED => {
            InboundFrame::Event(InboundEvent::YourTokenUpdated(token(&event, data)?))
        }
        ws::YOUR_TOKEN_COMPLETED => InboundFrame::Event(InboundEvent::YourTokenCompleted),
        ws::QUEUE_EMPTY => InboundFrame::Event(InboundEvent::QueueEmpty {
            message: message(data),
        }),
        ws::CONNECT_ERROR => InboundFrame::ConnectError(message(data)),
        _ => return Ok(None),
    };
    Ok(Some(frame))
}

/// Encode a room command as a text frame.
pub fn encode_command(command: RoomCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ws::Envelope::try_from(command)?)
}

fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|e| FrameError::Payload {
        event: event.to_string(),
        message: e.to_string(),
    })
}

fn domain<D, T>(event: &str, dto: D) -> Result<T, FrameError>
where
    T: TryFrom<D, Error = ValueObjectError>,
{
    T::try_from(dto).map_err(|e| FrameError::Payload {
        event: event.to_string(),
        message: e.to_string(),
    })
}

fn token(event: &str, data: Value) -> Result<ActiveToken, FrameError> {
    let dto: http::TokenDto = payload(event, data)?;
    domain(event, dto)
}

fn message(data: Value) -> String {
    serde_json::from_value::<ws::MessagePayload>(data)
        .map(ws::MessagePayload::into_message)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenStatus;

    #[test]
    fn test_decode_status_update() {
        // テスト項目: status_update フレームが QueueStatus に変換される
        // given (前提条件):
        let text = r#"{"event":"queue:status_update","data":{"queueId":"q1","currentTokenNo":5,"waitingCount":2,"lastServedTokenNumber":4,"sequence":9}}"#;

        // when (操作):
        let frame = decode_frame(text).unwrap();

        // then (期待する結果):
        let Some(InboundFrame::Event(InboundEvent::StatusUpdate(status))) = frame else {
            panic!("unexpected frame: {:?}", frame);
        };
        assert_eq!(status.queue_id.as_str(), "q1");
        assert_eq!(status.current_token_no, 5);
        assert_eq!(status.last_served_token_number, Some(4));
        assert_eq!(status.estimated_wait_time, None);
        assert_eq!(status.sequence, Some(9));
    }

    #[test]
    fn test_decode_token_called() {
        // テスト項目: your_token_called フレームがトークン付きイベントに変換される
        // given (前提条件):
        let text = r#"{"event":"queue:your_token_called","data":{"id":"t1","queueId":"q1","tokenNumber":42,"status":"CALLED"}}"#;

        // when (操作):
        let frame = decode_frame(text).unwrap();

        // then (期待する結果):
        let Some(InboundFrame::Event(InboundEvent::YourTokenCalled(token))) = frame else {
            panic!("unexpected frame: {:?}", frame);
        };
        assert_eq!(token.token_number, 42);
        assert_eq!(token.status, TokenStatus::Called);
    }

    #[test]
    fn test_decode_completed_without_payload() {
        // テスト項目: ペイロードの無い your_token_completed もデコードできる
        let frame = decode_frame(r#"{"event":"queue:your_token_completed"}"#).unwrap();
        assert_eq!(frame, Some(InboundFrame::Event(InboundEvent::YourTokenCompleted)));
    }

    #[test]
    fn test_decode_message_payloads() {
        // テスト項目: queue:empty / connect_error は文字列でもオブジェクトでも受け付ける
        // given (前提条件):
        let empty = r#"{"event":"queue:empty","data":{"message":"No patients waiting"}}"#;
        let error = r#"{"event":"connect_error","data":"jwt expired"}"#;

        // when (操作):
        let empty = decode_frame(empty).unwrap();
        let error = decode_frame(error).unwrap();

        // then (期待する結果):
        assert_eq!(
            empty,
            Some(InboundFrame::Event(InboundEvent::QueueEmpty {
                message: "No patients waiting".to_string()
            }))
        );
        assert_eq!(error, Some(InboundFrame::ConnectError("jwt expired".to_string())));
    }

    #[test]
    fn test_unknown_event_is_skipped() {
        // テスト項目: 未知のイベントはエラーではなく None になる
        let frame = decode_frame(r#"{"event":"queue:something_new","data":{}}"#).unwrap();
        assert_eq!(frame, None);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        // テスト項目: 壊れた JSON や不正なペイロードはエラーとして報告される
        // given (前提条件):
        let not_json = "hello";
        let bad_payload = r#"{"event":"queue:your_token_called","data":{"id":""}}"#;

        // when (操作):
        let not_json = decode_frame(not_json);
        let bad_payload = decode_frame(bad_payload);

        // then (期待する結果):
        assert!(matches!(not_json, Err(FrameError::Malformed(_))));
        assert!(matches!(bad_payload, Err(FrameError::Payload { .. })));
    }

    #[test]
    fn test_encode_commands() {
        // テスト項目: ルームコマンドがイベント名とペイロードの形式でエンコードされる
        // given (前提条件):
        let queue_id = QueueId::new("q1").unwrap();
        let join = RoomCommand::JoinQueue(queue_id.clone());
        let complete = RoomCommand::CompleteToken {
            queue_id,
            token_id: TokenId::new("t5").unwrap(),
        };

        // when (操作):
        let join: Value = serde_json::from_str(&encode_command(join).unwrap()).unwrap();
        let complete: Value = serde_json::from_str(&encode_command(complete).unwrap()).unwrap();

        // then (期待する結果):
        assert_eq!(join, serde_json::json!({"event": "join-queue", "data": "q1"}));
        assert_eq!(
            complete,
            serde_json::json!({
                "event": "queue:complete_token",
                "data": {"queueId": "q1", "tokenId": "t5"}
            })
        );
    }
}
