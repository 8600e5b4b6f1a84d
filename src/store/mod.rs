//! Storage abstraction for the document corpus.
//!
//! The [`DocumentStore`] trait is the single writer of record for
//! documents, their chunk sequences, and lifecycle status. Two backends:
//!
//! - [`SqliteStore`]: production store over `sqlx` + SQLite.
//! - [`InMemoryStore`]: `RwLock`-guarded maps for tests.
//!
//! All mutation is whole-field replacement (status, embedding, chunk set).
//! Implementations must be `Send + Sync` to be shared across pipeline
//! workers.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Category, Chunk, CorpusStats, Document, Status};

/// Current Unix time in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](DocumentStore::insert_document) | Persist a new document |
/// | [`get_document`](DocumentStore::get_document) | Fetch a document with its chunks |
/// | [`list_documents`](DocumentStore::list_documents) | Paginated listing, newest first |
/// | [`delete_document`](DocumentStore::delete_document) | Remove a document and its chunks |
/// | [`set_status`](DocumentStore::set_status) | Single-field status update |
/// | [`complete_processing`](DocumentStore::complete_processing) | Final pipeline write |
/// | [`mark_failed`](DocumentStore::mark_failed) | Terminal failure write |
/// | [`scan_documents`](DocumentStore::scan_documents) | Full scan for retrieval |
/// | [`stats`](DocumentStore::stats) | Aggregate counts |
/// | [`reset_stale`](DocumentStore::reset_stale) | Recover stuck `processing` documents |
/// | [`pending_ids`](DocumentStore::pending_ids) | Startup recovery |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    /// Fetch a document including its embedding and ordered chunks.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// List documents ordered by `created_at` descending (ties by id).
    /// Chunks are not loaded.
    async fn list_documents(
        &self,
        limit: i64,
        offset: i64,
        category: Option<Category>,
    ) -> Result<Vec<Document>>;

    /// Returns `false` if no such document existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Update only `status` and `updated_at`. Returns `false` if the
    /// document does not exist.
    async fn set_status(&self, id: &str, status: Status) -> Result<bool>;

    /// Store the whole-document embedding, replace the chunk set, and mark
    /// the document `processed`, all in one logical update.
    async fn complete_processing(
        &self,
        id: &str,
        embedding: &[f32],
        chunks: &[Chunk],
    ) -> Result<bool>;

    /// Mark the document `error`, clearing its embedding and chunks.
    async fn mark_failed(&self, id: &str) -> Result<bool>;

    /// Every document matching the optional category, newest first. Chunks
    /// (with embeddings) are loaded only when `with_chunks` is set.
    async fn scan_documents(
        &self,
        category: Option<Category>,
        with_chunks: bool,
    ) -> Result<Vec<Document>>;

    async fn stats(&self) -> Result<CorpusStats>;

    /// Reset documents that have been `processing` since before
    /// `older_than` back to `pending`. Returns the reset IDs.
    async fn reset_stale(&self, older_than: i64) -> Result<Vec<String>>;

    /// IDs of every `pending` document, oldest first.
    async fn pending_ids(&self) -> Result<Vec<String>>;
}

/// Ordering shared by listing and retrieval tie-breaks: newest first,
/// then ascending id.
pub(crate) fn newest_first(a: &Document, b: &Document) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
