use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Message;

/// Event names used on the wire
pub mod events {
    pub const ALL_CHATS: &str = "allChats";
    pub const MESSAGE: &str = "message";
    pub const MSG_SENT: &str = "msgSent";
    pub const READ: &str = "read";
    pub const JOIN_ROOM: &str = "joinRoom";
    pub const LEAVE_ROOM: &str = "leaveRoom";
    pub const ERROR: &str = "error";
}

/// `{tenantId, message}` body of inbound `message` and `read` events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub tenant_id: String,
    pub message: Message,
}

/// Inbound WebSocket events from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum WsInboundEvent {
    #[serde(rename = "message")]
    Message(MessageEnvelope),
    #[serde(rename = "read")]
    Read(MessageEnvelope),
    #[serde(rename = "joinRoom")]
    JoinRoom(String),
    #[serde(rename = "leaveRoom")]
    LeaveRoom(String),
}

impl WsInboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WsInboundEvent::Message(_) => events::MESSAGE,
            WsInboundEvent::Read(_) => events::READ,
            WsInboundEvent::JoinRoom(_) => events::JOIN_ROOM,
            WsInboundEvent::LeaveRoom(_) => events::LEAVE_ROOM,
        }
    }
}

/// Payload of outbound `error` frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    /// Inbound event that was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl ErrorPayload {
    pub fn from_app_error(err: &AppError, event: Option<&str>) -> Self {
        let message = match err {
            AppError::Store(_) => "document store unavailable".to_string(),
            other => other.to_string(),
        };
        Self {
            code: err.code().to_string(),
            message,
            event: event.map(str::to_string),
        }
    }
}

#[derive(Serialize)]
struct Frame<'a, T: ?Sized> {
    event: &'a str,
    data: &'a T,
}

/// Encode `{"event": name, "data": payload}`
pub fn encode_frame<T: Serialize + ?Sized>(
    event: &str,
    data: &T,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame { event, data })
}
