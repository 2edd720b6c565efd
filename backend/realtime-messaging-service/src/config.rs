use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

/// WebSocket transport limits
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Live connections a single user may hold at once
    pub max_connections_per_user: usize,
    /// Bounded outbound queue per connection
    pub outbound_queue_capacity: usize,
    /// Inbound events a connection may have waiting for its consumer
    pub inbound_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: 10,
            outbound_queue_capacity: 256,
            inbound_queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub gateway_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` selects the in-memory document store
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub credential_encryption_key: [u8; 32],
    pub push: PushConfig,
    pub ws: WsConfig,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = parse_or("PORT", 3000u16)?;
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;

        let key_env = env::var("CREDENTIAL_ENCRYPTION_KEY").map_err(|_| {
            AppError::Config(
                "CREDENTIAL_ENCRYPTION_KEY missing (required to read tenant push credentials)"
                    .into(),
            )
        })?;
        let credential_encryption_key = Self::decode_key(&key_env)?;

        let push = PushConfig {
            gateway_url: env::var("PUSH_GATEWAY_URL")
                .unwrap_or_else(|_| nova_push_gateway::DEFAULT_GATEWAY_URL.to_string()),
            timeout: Duration::from_secs(parse_or("PUSH_TIMEOUT_SECS", 10u64)?),
        };

        let ws = WsConfig {
            max_connections_per_user: parse_or("WS_MAX_CONNECTIONS_PER_USER", 10usize)?,
            outbound_queue_capacity: parse_or("WS_OUTBOUND_QUEUE_CAPACITY", 256usize)?,
            inbound_queue_capacity: parse_or("WS_INBOUND_QUEUE_CAPACITY", 64usize)?,
            heartbeat_interval: Duration::from_secs(parse_or("WS_HEARTBEAT_INTERVAL_SECS", 5u64)?),
            client_timeout: Duration::from_secs(parse_or("WS_CLIENT_TIMEOUT_SECS", 30u64)?),
        };

        if ws.max_connections_per_user == 0
            || ws.outbound_queue_capacity == 0
            || ws.inbound_queue_capacity == 0
        {
            return Err(AppError::Config(
                "WS_MAX_CONNECTIONS_PER_USER and the WS queue capacities must be positive".into(),
            ));
        }

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            jwt_secret,
            credential_encryption_key,
            push,
            ws,
        })
    }

    fn decode_key(value: &str) -> Result<[u8; 32], AppError> {
        let bytes = STANDARD
            .decode(value.trim().as_bytes())
            .map_err(|e| AppError::Config(format!("CREDENTIAL_ENCRYPTION_KEY decode: {e}")))?;

        bytes
            .try_into()
            .map_err(|_| AppError::Config("CREDENTIAL_ENCRYPTION_KEY must be 32 bytes".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_key_accepts_32_bytes() {
        let encoded = STANDARD.encode([7u8; 32]);
        let key = Config::decode_key(&encoded).unwrap();
        assert_eq!(key, [7u8; 32]);
    }

    #[test]
    fn test_decode_key_rejects_wrong_length() {
        let encoded = STANDARD.encode([7u8; 16]);
        assert!(matches!(
            Config::decode_key(&encoded),
            Err(AppError::Config(_))
        ));
        assert!(Config::decode_key("not base64!").is_err());
    }

    #[test]
    fn test_ws_defaults() {
        let ws = WsConfig::default();
        assert_eq!(ws.max_connections_per_user, 10);
        assert_eq!(ws.outbound_queue_capacity, 256);
        assert!(ws.client_timeout > ws.heartbeat_interval);
    }
}
