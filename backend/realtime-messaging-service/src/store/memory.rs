use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CollectionPath, Document, DocumentData, DocumentStore, StoreError};

type Collections = HashMap<CollectionPath, BTreeMap<String, DocumentData>>;

/// Process-local document store
///
/// Used when no `DATABASE_URL` is configured and throughout the tests.
/// Contents are lost on restart.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_documents<'a>(docs: impl Iterator<Item = (&'a String, &'a DocumentData)>) -> Vec<Document> {
    docs.map(|(id, data)| Document {
        id: id.clone(),
        data: data.clone(),
    })
    .collect()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add(&self, path: &CollectionPath, data: DocumentData) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let mut guard = self.inner.write().await;
        guard
            .entry(path.clone())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(path)
            .map(|c| to_documents(c.iter()))
            .unwrap_or_default())
    }

    async fn find_eq(
        &self,
        path: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(path)
            .map(|c| to_documents(c.iter().filter(|(_, data)| data.get(field) == Some(value))))
            .unwrap_or_default())
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.get(path).and_then(|c| {
            c.get(id).map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            })
        }))
    }

    async fn set(
        &self,
        path: &CollectionPath,
        id: &str,
        data: DocumentData,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: DocumentData,
    ) -> Result<Document, StoreError> {
        let mut guard = self.inner.write().await;
        let existing = guard
            .get_mut(path)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            })?;
        existing.extend(patch);
        Ok(Document {
            id: id.to_string(),
            data: existing.clone(),
        })
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(collection) = guard.get_mut(path) {
            collection.remove(id);
            if collection.is_empty() {
                guard.remove(path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> DocumentData {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_update_keeps_unrelated_fields() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::new("t1", "messages").unwrap();

        let id = store
            .add(&path, data(json!({ "text": "hi", "read": false })))
            .await
            .unwrap();
        let updated = store
            .update(&path, &id, data(json!({ "read": true })))
            .await
            .unwrap();
        assert_eq!(updated.data["read"], json!(true));

        let doc = store.get(&path, &id).await.unwrap().unwrap();
        assert_eq!(doc.data["text"], json!("hi"));
        assert_eq!(doc.data["read"], json!(true));
    }

    #[tokio::test]
    async fn test_update_never_inserts() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::new("t1", "messages").unwrap();
        let id = store
            .add(&path, data(json!({ "text": "hi" })))
            .await
            .unwrap();
        store.delete(&path, &id).await.unwrap();

        let result = store
            .update(&path, &id, data(json!({ "read": true })))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(store.get(&path, &id).await.unwrap().is_none());
        assert!(store.list(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_overwrites_body() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::new("t1", "messages").unwrap();

        let id = store
            .add(&path, data(json!({ "text": "hi", "read": false })))
            .await
            .unwrap();
        store
            .set(&path, &id, data(json!({ "read": true })))
            .await
            .unwrap();

        let doc = store.get(&path, &id).await.unwrap().unwrap();
        assert!(doc.data.get("text").is_none());
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = MemoryDocumentStore::new();
        let a = CollectionPath::new("tenant-a", "messages").unwrap();
        let b = CollectionPath::new("tenant-b", "messages").unwrap();

        store.add(&a, data(json!({ "toId": "u1" }))).await.unwrap();

        assert_eq!(
            store.find_eq(&a, "toId", &json!("u1")).await.unwrap().len(),
            1
        );
        assert!(store
            .find_eq(&b, "toId", &json!("u1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::new("t1", "messages").unwrap();
        store.delete(&path, "nope").await.unwrap();
        assert!(store.list(&path).await.unwrap().is_empty());
    }
}
