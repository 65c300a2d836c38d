use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::types::Json;

use crate::application::repos::{CasOutcome, Document, DocumentStore, StoreError, Versioned};

use super::PostgresDocumentStore;
use super::util::{map_sqlx_error, version_from_db, version_to_db};

#[derive(sqlx::FromRow)]
struct DocumentRow {
    key: String,
    body: Json<Value>,
}

#[derive(sqlx::FromRow)]
struct VersionedRow {
    version: i64,
    body: Json<Value>,
}

fn into_pairs(rows: Vec<DocumentRow>) -> Vec<(String, Document)> {
    rows.into_iter().map(|row| (row.key, row.body.0)).collect()
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let body: Option<Json<Value>> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(body.map(|body| body.0))
    }

    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        value: Document,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, key) DO UPDATE
               SET body = EXCLUDED.body,
                   version = documents.version + 1,
                   updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(Json(value))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_document(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn query_by_field_less_or_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        // jsonb orders across types; only compare values of the same kind.
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT key, body
              FROM documents
             WHERE collection = $1
               AND jsonb_typeof(body -> $2) = jsonb_typeof($3)
               AND body -> $2 <= $3
             ORDER BY key
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_pairs(rows))
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT key, body
              FROM documents
             WHERE collection = $1
               AND jsonb_typeof(body -> $2) = 'array'
               AND body -> $2 @> $3
             ORDER BY key
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(json!([value])))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_pairs(rows))
    }

    async fn query_by_field_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT key, body
              FROM documents
             WHERE collection = $1
               AND body -> $2 = $3
             ORDER BY key
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_pairs(rows))
    }

    async fn list_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let rows: Vec<DocumentRow> =
            sqlx::query_as("SELECT key, body FROM documents WHERE collection = $1 ORDER BY key")
                .bind(collection)
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(into_pairs(rows))
    }

    async fn get_versioned(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Versioned>, StoreError> {
        let row: Option<VersionedRow> = sqlx::query_as(
            "SELECT version, body FROM documents WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            Ok(Versioned {
                version: version_from_db(row.version)?,
                document: row.body.0,
            })
        })
        .transpose()
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        key: &str,
        expected_version: u64,
        value: Document,
    ) -> Result<CasOutcome, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE documents
               SET body = $4,
                   version = version + 1,
                   updated_at = now()
             WHERE collection = $1
               AND key = $2
               AND version = $3
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(version_to_db(expected_version)?)
        .bind(Json(value))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 1 {
            return Ok(CasOutcome::Applied);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE collection = $1 AND key = $2)",
        )
        .bind(collection)
        .bind(key)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(if exists {
            CasOutcome::Conflict
        } else {
            CasOutcome::Missing
        })
    }
}
