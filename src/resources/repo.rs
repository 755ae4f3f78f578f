use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use super::Collection;
use crate::{
    error::{AppError, AppResult},
    query::{Retrieval, CREATED_AT_FIELD, ID_FIELD},
};

pub type Document = Map<String, Value>;

/// Storage for the JSON documents of every collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Executes a retrieval, projection included.
    async fn fetch(&self, retrieval: &Retrieval) -> AppResult<Vec<Value>>;

    async fn get(&self, collection: Collection, id: Uuid) -> AppResult<Option<Value>>;

    async fn insert(&self, collection: Collection, body: Document) -> AppResult<Value>;

    /// Shallow merge of `patch` into the stored body. `None` when absent.
    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Document,
    ) -> AppResult<Option<Value>>;

    /// `false` when nothing was deleted.
    async fn delete(&self, collection: Collection, id: Uuid) -> AppResult<bool>;
}

/// Drops keys owned by the store; clients cannot set them.
pub(crate) fn strip_reserved(mut body: Document) -> Document {
    body.remove(ID_FIELD);
    body.remove(CREATED_AT_FIELD);
    body
}

/// Body with the identity and timestamp folded in.
pub(crate) fn to_document(id: Uuid, created_at: OffsetDateTime, body: Document) -> AppResult<Value> {
    let created_at = created_at
        .format(&Rfc3339)
        .map_err(|e| AppError::Internal(e.into()))?;
    let mut doc = Map::with_capacity(body.len() + 2);
    doc.insert(ID_FIELD.into(), Value::String(id.to_string()));
    doc.extend(body);
    doc.insert(CREATED_AT_FIELD.into(), Value::String(created_at));
    Ok(Value::Object(doc))
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    created_at: OffsetDateTime,
    body: Value,
}

impl DocumentRow {
    fn into_document(self) -> AppResult<Value> {
        let body = match self.body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        to_document(self.id, self.created_at, body)
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    db: PgPool,
}

impl PgDocumentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn fetch(&self, retrieval: &Retrieval) -> AppResult<Vec<Value>> {
        let mut query = retrieval.to_sql();
        let rows = query
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.db)
            .await?;
        rows.into_iter()
            .map(|row| Ok(retrieval.spec.projection.apply(row.into_document()?)))
            .collect()
    }

    async fn get(&self, collection: Collection, id: Uuid) -> AppResult<Option<Value>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, created_at, body
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(DocumentRow::into_document).transpose()
    }

    async fn insert(&self, collection: Collection, body: Document) -> AppResult<Value> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (collection, body)
            VALUES ($1, $2)
            RETURNING id, created_at, body
            "#,
        )
        .bind(collection.as_str())
        .bind(Value::Object(strip_reserved(body)))
        .fetch_one(&self.db)
        .await?;
        row.into_document()
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Document,
    ) -> AppResult<Option<Value>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            UPDATE documents
            SET body = body || $3
            WHERE collection = $1 AND id = $2
            RETURNING id, created_at, body
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(Value::Object(strip_reserved(patch)))
        .fetch_optional(&self.db)
        .await?;
        row.map(DocumentRow::into_document).transpose()
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
