//! SQLite-backed [`DocumentStore`].
//!
//! Embeddings are stored as little-endian f32 BLOBs (see
//! [`vec_to_blob`]). Chunk rows cascade-delete with their document.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{now_ts, DocumentStore};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Category, Chunk, CorpusStats, Document, Status};

const DOCUMENT_COLUMNS: &str = "id, title, content, category, source, filename, owner_id, \
     status, embedding, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, content, start_offset, end_offset, hash, embedding \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let category: String = row.get("category");
    let status: String = row.get("status");
    let embedding: Option<Vec<u8>> = row.get("embedding");

    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        category: category.parse().map_err(|e: String| anyhow!(e))?,
        source: row.get("source"),
        filename: row.get("filename"),
        owner_id: row.get("owner_id"),
        status: status.parse().map_err(|e: String| anyhow!(e))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        embedding: embedding.map(|b| blob_to_vec(&b)),
        chunks: Vec::new(),
    })
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        hash: row.get("hash"),
        embedding: embedding.map(|b| blob_to_vec(&b)),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, category, source, filename,
                                   owner_id, status, embedding, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(doc.category.label())
        .bind(&doc.source)
        .bind(&doc.filename)
        .bind(&doc.owner_id)
        .bind(doc.status.as_str())
        .bind(doc.embedding.as_deref().map(vec_to_blob))
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let mut doc = match row {
            Some(row) => row_to_document(&row)?,
            None => return Ok(None),
        };
        doc.chunks = self.load_chunks(id).await?;

        Ok(Some(doc))
    }

    async fn list_documents(
        &self,
        limit: i64,
        offset: i64,
        category: Option<Category>,
    ) -> Result<Vec<Document>> {
        let label = category.map(|c| c.label());
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE (? IS NULL OR category = ?) \
             ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS
        ))
        .bind(label)
        .bind(label)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, id: &str, status: Status) -> Result<bool> {
        let result = sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_processing(
        &self,
        id: &str,
        embedding: &[f32],
        chunks: &[Chunk],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE documents SET embedding = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(vec_to_blob(embedding))
        .bind(Status::Processed.as_str())
        .bind(now_ts())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content,
                                    start_offset, end_offset, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(&chunk.hash)
            .bind(chunk.embedding.as_deref().map(vec_to_blob))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_failed(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE documents SET embedding = NULL, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(Status::Error.as_str())
        .bind(now_ts())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn scan_documents(
        &self,
        category: Option<Category>,
        with_chunks: bool,
    ) -> Result<Vec<Document>> {
        let label = category.map(|c| c.label());
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE (? IS NULL OR category = ?) \
             ORDER BY created_at DESC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(label)
        .bind(label)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = rows
            .iter()
            .map(row_to_document)
            .collect::<Result<Vec<_>>>()?;

        if with_chunks {
            let chunk_rows = sqlx::query(
                r#"
                SELECT c.id, c.document_id, c.chunk_index, c.content, c.start_offset,
                       c.end_offset, c.hash, c.embedding
                FROM chunks c
                JOIN documents d ON d.id = c.document_id
                WHERE (? IS NULL OR d.category = ?)
                ORDER BY c.document_id, c.chunk_index ASC
                "#,
            )
            .bind(label)
            .bind(label)
            .fetch_all(&self.pool)
            .await?;

            let mut by_doc: HashMap<String, Vec<Chunk>> = HashMap::new();
            for row in &chunk_rows {
                let chunk = row_to_chunk(row);
                by_doc
                    .entry(chunk.document_id.clone())
                    .or_default()
                    .push(chunk);
            }
            for doc in &mut docs {
                doc.chunks = by_doc.remove(&doc.id).unwrap_or_default();
            }
        }

        Ok(docs)
    }

    async fn stats(&self) -> Result<CorpusStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM documents GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_category: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) FROM documents GROUP BY category ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(CorpusStats {
            total,
            by_status,
            by_category,
        })
    }

    async fn reset_stale(&self, older_than: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ? \
             WHERE status = ? AND updated_at < ? RETURNING id",
        )
        .bind(Status::Pending.as_str())
        .bind(now_ts())
        .bind(Status::Processing.as_str())
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        let mut ids: Vec<String> = rows.iter().map(|r| r.get("id")).collect();
        ids.sort();
        Ok(ids)
    }

    async fn pending_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM documents WHERE status = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(Status::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
