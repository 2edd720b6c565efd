#![allow(dead_code)]

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use nova_push_gateway::{GatewayPayload, GatewaySendResult, PushGatewayError};
use realtime_messaging_service::config::{Config, PushConfig, WsConfig};
use realtime_messaging_service::middleware::Claims;
use realtime_messaging_service::services::directory::{
    APPS_COLLECTION, PLATFORM_TENANT, USERS_COLLECTION,
};
use realtime_messaging_service::services::{CredentialCipher, PushGateway};
use realtime_messaging_service::state::AppState;
use realtime_messaging_service::store::{to_document_data, MemoryDocumentStore, StoreClient};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TENANT: &str = "tenant-a";
pub const JWT_SECRET: &str = "integration-test-secret";
pub const ENCRYPTION_KEY: [u8; 32] = [42u8; 32];
pub const SERVER_KEY: &str = "tenant-a-server-key";

pub fn test_config() -> Config {
    Config {
        port: 0,
        database_url: None,
        database_max_connections: 1,
        jwt_secret: JWT_SECRET.to_string(),
        credential_encryption_key: ENCRYPTION_KEY,
        push: PushConfig {
            gateway_url: "http://127.0.0.1:9/fcm/send".to_string(),
            timeout: Duration::from_secs(1),
        },
        ws: WsConfig::default(),
    }
}

pub fn memory_store() -> StoreClient {
    StoreClient::new(Arc::new(MemoryDocumentStore::new()))
}

pub fn token_for(tenant: &str, user: &str, role: Option<&str>) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user.to_string(),
        tenant: tenant.to_string(),
        role: role.map(str::to_string),
        exp: (now + 3600) as usize,
        iat: now as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to sign test token")
}

pub async fn seed_user(
    store: &StoreClient,
    tenant: &str,
    id: &str,
    name: &str,
    token: Option<&str>,
) {
    let mut body = json!({ "name": name });
    if let Some(token) = token {
        body["fcmToken"] = json!(token);
    }
    store
        .collection(tenant, USERS_COLLECTION)
        .unwrap()
        .doc(id)
        .set(to_document_data(&body).unwrap())
        .await
        .unwrap();
}

/// Store the tenant's push credential the way the admin console does
pub async fn seed_app(store: &StoreClient, tenant: &str, server_key: &str) {
    let sealed = CredentialCipher::new(&ENCRYPTION_KEY)
        .encrypt(server_key)
        .unwrap();
    store
        .collection(PLATFORM_TENANT, APPS_COLLECTION)
        .unwrap()
        .doc(tenant)
        .set(to_document_data(&json!({ "pushCredential": sealed })).unwrap())
        .await
        .unwrap();
}

/// Gateway double that records every accepted send
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(String, GatewayPayload)>>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<(String, GatewayPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(
        &self,
        server_key: &str,
        payload: &GatewayPayload,
    ) -> Result<GatewaySendResult, PushGatewayError> {
        self.sent
            .lock()
            .unwrap()
            .push((server_key.to_string(), payload.clone()));
        Ok(GatewaySendResult {
            status: 200,
            message_id: Some("0:1".to_string()),
            error: None,
        })
    }
}

/// App state over an in-memory store with alice, bob and push configured
pub async fn seeded_state() -> (AppState, StoreClient, Arc<RecordingGateway>) {
    let store = memory_store();
    seed_user(&store, TENANT, "alice", "Alice", Some("alice-device-token")).await;
    seed_user(&store, TENANT, "bob", "Bob", Some("bob-device-token")).await;
    seed_app(&store, TENANT, SERVER_KEY).await;

    let gateway = Arc::new(RecordingGateway::default());
    let state = AppState::new(test_config(), store.clone(), gateway.clone());
    (state, store, gateway)
}
