use thiserror::Error;

/// Push gateway error types
#[derive(Error, Debug)]
pub enum PushGatewayError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Push gateway request failed: {0}")]
    Request(String),

    #[error("Push gateway rejected request: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Missing push gateway credential")]
    MissingCredential,

    #[error("Invalid device token")]
    InvalidToken,
}

impl PushGatewayError {
    /// True when the gateway refused the credential itself (401/403).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, PushGatewayError::Api { status, .. } if *status == 401 || *status == 403)
    }
}
