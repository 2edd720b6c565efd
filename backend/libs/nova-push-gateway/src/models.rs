use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request body sent to the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPayload {
    /// Device registration token
    pub to: String,
    /// Client routing data (`page`, `postId`, ...)
    pub data: BTreeMap<String, String>,
    pub notification: GatewayNotification,
}

/// Visible notification part of the payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayNotification {
    pub title: String,
    pub body: String,
    pub badge: String,
    pub sound: String,
}

impl GatewayNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            badge: "1".to_string(),
            sound: "default".to_string(),
        }
    }
}

/// Result of a single accepted send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySendResult {
    pub status: u16,
    pub message_id: Option<String>,
    /// Per-token error reported inside a 2xx body (e.g. `NotRegistered`)
    pub error: Option<String>,
}

/// Legacy FCM response body; only read opportunistically
#[derive(Debug, Deserialize)]
pub(crate) struct LegacyResponse {
    #[serde(default)]
    pub results: Vec<LegacyResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LegacyResult {
    pub message_id: Option<String>,
    pub error: Option<String>,
}
