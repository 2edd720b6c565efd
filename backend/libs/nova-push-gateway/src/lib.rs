/// Nova Push Gateway Library
///
/// HTTP client for the FCM legacy send endpoint used by tenant applications.
/// Every tenant owns its own server key, so the key is supplied per request
/// instead of being bound to the client.
///
/// It handles:
/// - Request formatting (`{to, data, notification}`)
/// - Per-request `key=<server key>` authentication
/// - Mapping non-2xx responses to typed errors
/// - Device token validation

pub mod client;
pub mod errors;
pub mod models;

pub use client::FcmLegacyClient;
pub use errors::PushGatewayError;
pub use models::{GatewayNotification, GatewayPayload, GatewaySendResult};

/// Default FCM legacy HTTP endpoint
pub const DEFAULT_GATEWAY_URL: &str = "https://fcm.googleapis.com/fcm/send";
