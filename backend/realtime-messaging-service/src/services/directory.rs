//! Read-only lookups against the identity/app data owned by other subsystems.

use async_trait::async_trait;
use serde::Deserialize;

use crate::store::{StoreClient, StoreError};

pub const USERS_COLLECTION: &str = "users";

/// Platform-level scope holding one app record per tenant
pub const PLATFORM_TENANT: &str = "_platform";
pub const APPS_COLLECTION: &str = "apps";

/// Subset of a tenant user profile needed for notifications
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Push delivery token of the user's device installation
    #[serde(default)]
    pub fcm_token: Option<String>,
}

impl UserProfile {
    pub fn delivery_token(&self) -> Option<&str> {
        self.fcm_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub id: String,
    /// Encrypted push-gateway server key; absent if push was never set up
    #[serde(default)]
    pub push_credential: Option<String>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_by_id(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<UserProfile>, StoreError>;

    /// First user whose display name matches exactly
    async fn user_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<UserProfile>, StoreError>;

    async fn app_by_id(&self, tenant_id: &str) -> Result<Option<AppRecord>, StoreError>;
}

/// Directory backed by the shared document store
#[derive(Clone)]
pub struct StoreDirectory {
    store: StoreClient,
}

impl StoreDirectory {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Directory for StoreDirectory {
    async fn user_by_id(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let users = self.store.collection(tenant_id, USERS_COLLECTION)?;
        users
            .doc(user_id)
            .get()
            .await?
            .map(|doc| doc.into_typed())
            .transpose()
    }

    async fn user_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let users = self.store.collection(tenant_id, USERS_COLLECTION)?;
        users
            .where_eq("name", name)
            .get()
            .await?
            .into_iter()
            .next()
            .map(|doc| doc.into_typed())
            .transpose()
    }

    async fn app_by_id(&self, tenant_id: &str) -> Result<Option<AppRecord>, StoreError> {
        let apps = self.store.collection(PLATFORM_TENANT, APPS_COLLECTION)?;
        apps.doc(tenant_id)
            .get()
            .await?
            .map(|doc| doc.into_typed())
            .transpose()
    }
}
