use std::time::Duration;

use tracing::debug;

use crate::errors::PushGatewayError;
use crate::models::*;

/// FCM legacy HTTP client
///
/// Sends one notification per call to `POST <endpoint>?key=<server key>`.
/// Does not retry; callers decide what a failure means for them.
#[derive(Clone)]
pub struct FcmLegacyClient {
    endpoint: String,
    http_client: reqwest::Client,
}

impl FcmLegacyClient {
    /// Create new gateway client
    ///
    /// # Arguments
    /// * `endpoint` - Gateway URL without query string
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PushGatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushGatewayError::ClientBuild(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a payload using the tenant's server key
    pub async fn send(
        &self,
        server_key: &str,
        payload: &GatewayPayload,
    ) -> Result<GatewaySendResult, PushGatewayError> {
        if server_key.is_empty() {
            return Err(PushGatewayError::MissingCredential);
        }
        if !Self::validate_token(&payload.to) {
            return Err(PushGatewayError::InvalidToken);
        }

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", server_key)])
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| PushGatewayError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(PushGatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // The body is informational only; an unparseable 2xx still counts as accepted.
        let first = match response.json::<LegacyResponse>().await {
            Ok(body) => body.results.into_iter().next(),
            Err(e) => {
                debug!("Ignoring unparseable gateway response body: {}", e);
                None
            }
        };

        Ok(GatewaySendResult {
            status: status.as_u16(),
            message_id: first.as_ref().and_then(|r| r.message_id.clone()),
            error: first.and_then(|r| r.error),
        })
    }

    /// Validate device token format
    pub fn validate_token(device_token: &str) -> bool {
        // Registration tokens are opaque but never tiny or huge
        !device_token.trim().is_empty() && device_token.len() >= 10 && device_token.len() <= 4096
    }
}
