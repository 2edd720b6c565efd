use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{CollectionPath, Document, DocumentData, DocumentStore, StoreError};

/// PostgreSQL document store
///
/// Documents live in a single `documents` table keyed by
/// `(tenant_id, collection, id)` with a JSONB body. Equality filters are
/// expressed as containment (`data @> {field: value}`) so the GIN index
/// applies; for scalar values this is plain equality. Updates use
/// `data || patch`, a shallow top-level merge that only touches existing rows.
#[derive(Clone)]
pub struct PgDocumentStore {
    db: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to document database");
        Ok(Self { db })
    }

    /// Apply bundled migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    fn row_to_document(row: PgRow) -> Result<Document, StoreError> {
        let id: String = row.try_get("id")?;
        let Json(data): Json<Value> = row.try_get("data")?;
        match data {
            Value::Object(map) => Ok(Document { id, data: map }),
            other => Err(StoreError::Serialization(format!(
                "document {id} body is not an object: {other}"
            ))),
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self, data), fields(path = %path))]
    async fn add(&self, path: &CollectionPath, data: DocumentData) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();

        sqlx::query(
            r#"
            INSERT INTO documents (tenant_id, collection, id, data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .bind(&id)
        .bind(Json(Value::Object(data)))
        .execute(&self.db)
        .await?;

        Ok(id)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, data FROM documents
            WHERE tenant_id = $1 AND collection = $2
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::row_to_document).collect()
    }

    #[instrument(skip(self, value), fields(path = %path))]
    async fn find_eq(
        &self,
        path: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let mut filter = DocumentData::new();
        filter.insert(field.to_string(), value.clone());

        let rows = sqlx::query(
            r#"
            SELECT id, data FROM documents
            WHERE tenant_id = $1 AND collection = $2 AND data @> $3
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .bind(Json(Value::Object(filter)))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::row_to_document).collect()
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, data FROM documents
            WHERE tenant_id = $1 AND collection = $2 AND id = $3
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    #[instrument(skip(self, data), fields(path = %path))]
    async fn set(
        &self,
        path: &CollectionPath,
        id: &str,
        data: DocumentData,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (tenant_id, collection, id, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, collection, id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .bind(id)
        .bind(Json(Value::Object(data)))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, patch), fields(path = %path))]
    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: DocumentData,
    ) -> Result<Document, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE documents
            SET data = data || $4, updated_at = NOW()
            WHERE tenant_id = $1 AND collection = $2 AND id = $3
            RETURNING id, data
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .bind(id)
        .bind(Json(Value::Object(patch)))
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Self::row_to_document(row),
            None => Err(StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            }),
        }
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM documents
            WHERE tenant_id = $1 AND collection = $2 AND id = $3
            "#,
        )
        .bind(&path.tenant_id)
        .bind(&path.name)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
