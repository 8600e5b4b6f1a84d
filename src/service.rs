//! Document service: the synchronous API over extraction, storage,
//! retrieval, and pipeline scheduling.
//!
//! Synchronous stages (validation, extraction, initial persistence)
//! return [`ServiceError`]. Everything after scheduling happens in the
//! background and is only visible through the document's `status`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{extract_document, Format};
use crate::models::{Category, CorpusStats, Document, DocumentSummary, SearchResult, Status};
use crate::pipeline::{Outcome, Pipeline};
use crate::queue::{IngestQueue, PipelineStats};
use crate::search::{rank, RankMode};
use crate::session::{SessionRegistry, StagedUpload};
use crate::store::{now_ts, DocumentStore, SqliteStore};

/// Listing page size when the caller gives none.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// Raw submission: payload plus declared metadata.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub content: Vec<u8>,
    /// MIME type, extension, or filename. Falls back to `filename`.
    pub format: Option<String>,
    pub title: String,
    pub category: String,
    pub source: String,
    pub filename: String,
    pub owner_id: String,
}

pub struct Service {
    config: Config,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    pipeline: Arc<Pipeline>,
    queue: Option<IngestQueue>,
    sessions: SessionRegistry,
}

fn persistence(err: anyhow::Error) -> ServiceError {
    ServiceError::Persistence(err)
}

fn parse_category(label: &str) -> ServiceResult<Category> {
    label.parse().map_err(ServiceError::Validation)
}

fn parse_category_filter(label: Option<&str>) -> ServiceResult<Option<Category>> {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(l) => parse_category(l).map(Some),
        None => Ok(None),
    }
}

impl Service {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, embedder: Arc<dyn Embedder>) -> Self {
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            &config,
        ));
        Self {
            config,
            store,
            embedder,
            pipeline,
            queue: None,
            sessions: SessionRegistry::new(),
        }
    }

    /// Connect to the configured SQLite database and build the embedder.
    /// The schema must already exist (`legally init`).
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(config.clone(), store, embedder))
    }

    /// Start the background worker pool. Without it, submissions stay
    /// `pending` until processed with [`process_now`](Self::process_now)
    /// or picked up by a later server start.
    pub fn with_queue(mut self) -> Self {
        self.queue = Some(IngestQueue::start(
            Arc::clone(&self.pipeline),
            &self.config.pipeline,
        ));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn queue(&self) -> Option<&IngestQueue> {
        self.queue.as_ref()
    }

    async fn schedule(&self, id: &str) {
        if let Some(queue) = &self.queue {
            queue.enqueue(id).await;
        }
    }

    /// Extract, persist as `pending`, and schedule processing.
    pub async fn submit(&self, req: SubmitRequest) -> ServiceResult<DocumentSummary> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(ServiceError::Validation("title is required".to_string()));
        }
        let category = parse_category(req.category.trim())?;

        let declared = req
            .format
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&req.filename);
        let format = Format::from_declared(declared)?;
        let text = extract_document(&req.content, format, &self.config.extraction).await?;

        self.create(title, text, category, req.source, req.filename, req.owner_id)
            .await
    }

    async fn create(
        &self,
        title: &str,
        content: String,
        category: Category,
        source: String,
        filename: String,
        owner_id: String,
    ) -> ServiceResult<DocumentSummary> {
        let now = now_ts();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content,
            category,
            source,
            filename,
            owner_id,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
            embedding: None,
            chunks: Vec::new(),
        };

        self.store
            .insert_document(&doc)
            .await
            .map_err(persistence)?;
        tracing::info!(document_id = %doc.id, category = %doc.category, "document submitted");

        self.schedule(&doc.id).await;
        Ok(DocumentSummary::from(&doc))
    }

    /// Reset a document to `pending` and schedule it again.
    pub async fn reprocess(&self, id: &str) -> ServiceResult<()> {
        let found = self
            .store
            .set_status(id, Status::Pending)
            .await
            .map_err(persistence)?;
        if !found {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        tracing::info!(document_id = %id, "document reset to pending");
        self.schedule(id).await;
        Ok(())
    }

    /// Run the pipeline for `id` in the caller's task and wait for it.
    pub async fn process_now(&self, id: &str) -> ServiceResult<Outcome> {
        match self.pipeline.process(id).await.map_err(persistence)? {
            Outcome::Missing => Err(ServiceError::NotFound(id.to_string())),
            outcome => Ok(outcome),
        }
    }

    /// Rank stored documents against `query`. A missing or non-positive
    /// `limit` means `retrieval.default_limit`.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<i64>,
        category: Option<&str>,
    ) -> ServiceResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(ServiceError::Validation("query must not be empty".to_string()));
        }
        let category = parse_category_filter(category)?;
        let limit = match limit {
            Some(l) if l > 0 => l as usize,
            _ => self.config.retrieval.default_limit,
        };

        let mode = self.rank_mode(query).await;
        let with_chunks = matches!(mode, RankMode::Hybrid { .. });
        let docs = self
            .store
            .scan_documents(category, with_chunks)
            .await
            .map_err(persistence)?;

        Ok(rank(&docs, query, limit, &mode))
    }

    async fn rank_mode(&self, query: &str) -> RankMode {
        if self.config.retrieval.mode != "hybrid" {
            return RankMode::Text;
        }
        if !self.embedder.is_semantic() {
            tracing::debug!("hybrid retrieval needs a semantic embedder, using text scoring");
            return RankMode::Text;
        }
        match self.embedder.embed(query).await {
            Ok(query_embedding) => RankMode::Hybrid {
                query_embedding,
                semantic_weight: self.config.retrieval.semantic_weight,
                min_similarity: self.config.retrieval.min_similarity,
            },
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, using text scoring");
                RankMode::Text
            }
        }
    }

    pub async fn list(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
        category: Option<&str>,
    ) -> ServiceResult<Vec<Document>> {
        let category = parse_category_filter(category)?;
        let limit = match limit {
            Some(l) if l > 0 => l,
            _ => DEFAULT_LIST_LIMIT,
        };
        let offset = offset.unwrap_or(0).max(0);
        self.store
            .list_documents(limit, offset, category)
            .await
            .map_err(persistence)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Document> {
        self.store
            .get_document(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        let deleted = self.store.delete_document(id).await.map_err(persistence)?;
        if !deleted {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        tracing::info!(document_id = %id, "document deleted");
        Ok(())
    }

    pub async fn stats(&self) -> ServiceResult<CorpusStats> {
        self.store.stats().await.map_err(persistence)
    }

    pub fn categories(&self) -> Vec<&'static str> {
        Category::ALL.iter().map(Category::label).collect()
    }

    /// Extract `content` and cache the text for `owner` until
    /// [`submit_staged`](Self::submit_staged). A concurrent
    /// [`cancel_upload`](Self::cancel_upload) aborts the extraction.
    pub async fn stage_upload(
        &self,
        owner: &str,
        content: &[u8],
        format: Option<&str>,
        filename: &str,
    ) -> ServiceResult<StagedUpload> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(ServiceError::Validation("owner is required".to_string()));
        }
        let declared = format.filter(|f| !f.trim().is_empty()).unwrap_or(filename);
        let format = Format::from_declared(declared)?;

        let mut ticket = self.sessions.begin(owner);
        let generation = ticket.generation;

        let extracted = tokio::select! {
            result = extract_document(content, format, &self.config.extraction) => result,
            _ = ticket.cancelled() => {
                tracing::info!(owner = %owner, "staged upload cancelled during extraction");
                return Err(ServiceError::Cancelled(owner.to_string()));
            }
        };

        let text = match extracted {
            Ok(text) => text,
            Err(e) => {
                self.sessions.abandon(owner, generation);
                return Err(e.into());
            }
        };

        let upload = StagedUpload::new(
            filename.to_string(),
            format.extension().to_string(),
            text,
        );
        if !self.sessions.finish(owner, generation, upload.clone()) {
            return Err(ServiceError::Cancelled(owner.to_string()));
        }
        Ok(upload)
    }

    /// Submit the text staged for `owner`.
    pub async fn submit_staged(
        &self,
        owner: &str,
        title: &str,
        category: &str,
        source: &str,
    ) -> ServiceResult<DocumentSummary> {
        let owner = owner.trim();
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::Validation("title is required".to_string()));
        }
        let category = parse_category(category.trim())?;

        let upload = self.sessions.take(owner).ok_or_else(|| {
            ServiceError::NotFound(format!("no staged upload for owner {}", owner))
        })?;

        self.create(
            title,
            upload.text,
            category,
            source.to_string(),
            upload.filename,
            owner.to_string(),
        )
        .await
    }

    /// Drop staged text and any in-progress extraction for `owner`.
    pub fn cancel_upload(&self, owner: &str) -> bool {
        self.sessions.cancel(owner.trim())
    }

    pub fn pipeline_status(&self) -> Option<PipelineStats> {
        self.queue.as_ref().map(IngestQueue::stats)
    }

    /// Enqueue pending work and start the staleness sweeper.
    pub async fn start_background(&self) -> Result<()> {
        if let Some(queue) = &self.queue {
            queue.recover_pending(self.store.as_ref()).await?;
            queue.spawn_sweeper(Arc::clone(&self.store), &self.config.pipeline);
        }
        Ok(())
    }

    /// Wait for the worker pool to drain (tests and `--wait` callers).
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        match &self.queue {
            Some(queue) => queue.wait_idle(timeout).await,
            None => true,
        }
    }
}
