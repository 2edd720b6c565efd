//! Tenant-scoped document store capability.
//!
//! Components never talk to a database directly; they hold a [`StoreClient`]
//! and open collection handles with `collection(tenant, name)`. The backing
//! [`DocumentStore`] is injected at startup (Postgres or in-memory) and can be
//! replaced by a mock in tests.
//!
//! The contract is small: add, list, single-field equality
//! filter, get/set/delete by id. There is no OR predicate; callers that need
//! one issue several queries and merge the results themselves.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// JSON object body of a document (without its id)
pub type DocumentData = serde_json::Map<String, Value>;

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: String },

    #[error("invalid collection path: {0}")]
    InvalidPath(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// A stored document: store-assigned id plus its JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: DocumentData,
}

impl Document {
    /// Deserialize into a typed record, exposing the document id as `id`
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        serde_json::from_value(Value::Object(data))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// Serialize a record into a document body, dropping any `id` field
pub fn to_document_data<T: Serialize>(record: &T) -> Result<DocumentData, StoreError> {
    match serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// `(tenant, collection)` address of a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    pub tenant_id: String,
    pub name: String,
}

impl CollectionPath {
    pub fn new(tenant_id: &str, name: &str) -> Result<Self, StoreError> {
        for (label, part) in [("tenant", tenant_id), ("collection", name)] {
            if part.trim().is_empty() || part.contains('/') {
                return Err(StoreError::InvalidPath(format!("{label} `{part}`")));
            }
        }
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.name)
    }
}

/// Backend operations every document store provides.
/// Single-document writes are atomic; nothing else is assumed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert with a store-generated id
    async fn add(&self, path: &CollectionPath, data: DocumentData) -> Result<String, StoreError>;

    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError>;

    /// Documents whose top-level `field` equals `value`
    async fn find_eq(
        &self,
        path: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite the whole body
    async fn set(
        &self,
        path: &CollectionPath,
        id: &str,
        data: DocumentData,
    ) -> Result<(), StoreError>;

    /// Merge top-level fields into an existing document and return it.
    /// Never inserts: a missing document is `StoreError::NotFound`.
    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: DocumentData,
    ) -> Result<Document, StoreError>;

    /// Deleting a missing document is not an error
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError>;
}

/// Injected store capability shared by every component
#[derive(Clone)]
pub struct StoreClient {
    backend: Arc<dyn DocumentStore>,
}

impl StoreClient {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    pub fn collection(&self, tenant_id: &str, name: &str) -> Result<Collection, StoreError> {
        Ok(Collection {
            backend: self.backend.clone(),
            path: CollectionPath::new(tenant_id, name)?,
        })
    }
}

/// Handle to one tenant-scoped collection
#[derive(Clone)]
pub struct Collection {
    backend: Arc<dyn DocumentStore>,
    path: CollectionPath,
}

impl Collection {
    pub async fn add(&self, data: DocumentData) -> Result<String, StoreError> {
        self.backend.add(&self.path, data).await
    }

    pub async fn get(&self) -> Result<Vec<Document>, StoreError> {
        self.backend.list(&self.path).await
    }

    pub fn where_eq(&self, field: &str, value: impl Into<Value>) -> Query<'_> {
        Query {
            collection: self,
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn doc(&self, id: &str) -> DocumentRef<'_> {
        DocumentRef {
            collection: self,
            id: id.to_string(),
        }
    }
}

/// Single-field equality query
pub struct Query<'a> {
    collection: &'a Collection,
    field: String,
    value: Value,
}

impl Query<'_> {
    pub async fn get(&self) -> Result<Vec<Document>, StoreError> {
        self.collection
            .backend
            .find_eq(&self.collection.path, &self.field, &self.value)
            .await
    }
}

pub struct DocumentRef<'a> {
    collection: &'a Collection,
    id: String,
}

impl DocumentRef<'_> {
    pub async fn get(&self) -> Result<Option<Document>, StoreError> {
        self.collection
            .backend
            .get(&self.collection.path, &self.id)
            .await
    }

    pub async fn set(&self, data: DocumentData) -> Result<(), StoreError> {
        self.collection
            .backend
            .set(&self.collection.path, &self.id, data)
            .await
    }

    pub async fn update(&self, patch: DocumentData) -> Result<Document, StoreError> {
        self.collection
            .backend
            .update(&self.collection.path, &self.id, patch)
            .await
    }

    pub async fn delete(&self) -> Result<(), StoreError> {
        self.collection
            .backend
            .delete(&self.collection.path, &self.id)
            .await
    }
}
