use std::sync::Arc;

use crate::config::Config;
use crate::middleware::JwtVerifier;
use crate::services::{
    ConversationStore, CredentialCipher, NotificationDispatcher, PushGateway, StoreDirectory,
};
use crate::store::StoreClient;
use crate::websocket::{ConnectionRegistry, EventRouter};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub conversations: ConversationStore,
    pub dispatcher: NotificationDispatcher,
    pub router: EventRouter,
    pub jwt: JwtVerifier,
}

impl AppState {
    /// Wire every component over one store and one push gateway
    pub fn new(config: Config, store: StoreClient, gateway: Arc<dyn PushGateway>) -> Self {
        let registry = ConnectionRegistry::new(config.ws.max_connections_per_user);
        let conversations = ConversationStore::new(store.clone());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(StoreDirectory::new(store)),
            gateway,
            CredentialCipher::new(&config.credential_encryption_key),
        );
        let router = EventRouter::new(registry.clone(), conversations.clone(), dispatcher.clone());
        let jwt = JwtVerifier::new(&config.jwt_secret);

        Self {
            config: Arc::new(config),
            registry,
            conversations,
            dispatcher,
            router,
            jwt,
        }
    }
}
