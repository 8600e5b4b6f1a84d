//! Document lifecycle pipeline.
//!
//! Drives one document from `pending` to a terminal state:
//!
//! ```text
//! load ─▶ processing ─▶ embed document ─▶ chunk ─▶ embed chunks ─▶ processed
//!                             │
//!                             └──failure──▶ error
//! ```
//!
//! A whole-document embedding failure fails the document. Per-chunk
//! failures are tolerated: the chunk is kept with no embedding. The final
//! write stores embedding, chunks, and status together.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};

use crate::chunk::{into_chunks, split_paragraphs};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::models::Status;
use crate::store::DocumentStore;

/// Result of a single pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Processed {
        chunks: usize,
        chunk_failures: usize,
    },
    Failed(String),
    /// The document did not exist, or was deleted mid-run.
    Missing,
}

impl Outcome {
    pub fn status(&self) -> Option<Status> {
        match self {
            Outcome::Processed { .. } => Some(Status::Processed),
            Outcome::Failed(_) => Some(Status::Error),
            Outcome::Missing => None,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    min_chars: usize,
    chunk_concurrency: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            min_chars: config.chunking.min_chars,
            chunk_concurrency: config.pipeline.chunk_concurrency.max(1),
        }
    }

    /// Model identifier of the active embedder.
    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Run the lifecycle for one document.
    ///
    /// Provider failures end in [`Outcome::Failed`] with the document marked
    /// `error`. Store failures are returned as `Err`; the document may then
    /// be left `processing` until the staleness sweep resets it.
    pub async fn process(&self, id: &str) -> Result<Outcome> {
        let doc = match self.store.get_document(id).await? {
            Some(doc) => doc,
            None => {
                tracing::warn!(document_id = %id, "document not found, skipping");
                return Ok(Outcome::Missing);
            }
        };

        if !self.store.set_status(id, Status::Processing).await? {
            return Ok(Outcome::Missing);
        }
        tracing::debug!(document_id = %id, "processing started");

        let doc_embedding = match self.embedder.embed(&doc.content).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "document embedding failed");
                self.store.mark_failed(id).await?;
                return Ok(Outcome::Failed(e.to_string()));
            }
        };

        let mut chunks = into_chunks(id, split_paragraphs(&doc.content, self.min_chars));

        // `buffered` yields in input order, so results line up with chunks.
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let results: Vec<_> = stream::iter(texts.into_iter().map(|text| {
            let embedder = Arc::clone(&self.embedder);
            async move { embedder.embed(&text).await }
        }))
        .buffered(self.chunk_concurrency)
        .collect()
        .await;

        let mut chunk_failures = 0;
        for (chunk, result) in chunks.iter_mut().zip(results) {
            match result {
                Ok(v) => chunk.embedding = Some(v),
                Err(e) => {
                    chunk_failures += 1;
                    tracing::warn!(
                        document_id = %id,
                        chunk_index = chunk.chunk_index,
                        error = %e,
                        "chunk embedding failed, keeping chunk without embedding"
                    );
                }
            }
        }

        if !self
            .store
            .complete_processing(id, &doc_embedding, &chunks)
            .await?
        {
            tracing::warn!(document_id = %id, "document deleted during processing");
            return Ok(Outcome::Missing);
        }

        tracing::info!(
            document_id = %id,
            chunks = chunks.len(),
            chunk_failures,
            "document processed"
        );

        Ok(Outcome::Processed {
            chunks: chunks.len(),
            chunk_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::error::EmbedError;
    use crate::models::{Category, Document};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            4
        }
        fn is_semantic(&self) -> bool {
            false
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::ProviderUnavailable("connection refused".into()))
        }
    }

    /// Fails only for texts containing "poison".
    struct PickyEmbedder;

    #[async_trait]
    impl Embedder for PickyEmbedder {
        fn model_name(&self) -> &str {
            "picky"
        }
        fn dims(&self) -> usize {
            2
        }
        fn is_semantic(&self) -> bool {
            false
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text.contains("poison") && !text.contains("\n\n") {
                Err(EmbedError::ProviderError {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    async fn seeded(content: &str) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_document(&Document {
                id: "doc-1".into(),
                title: "Employment Contract".into(),
                content: content.into(),
                category: Category::LaborLaw,
                source: String::new(),
                filename: String::new(),
                owner_id: String::new(),
                status: Status::Pending,
                created_at: 1,
                updated_at: 1,
                embedding: None,
                chunks: Vec::new(),
            })
            .await
            .unwrap();
        store
    }

    fn pipeline(store: Arc<InMemoryStore>, embedder: Arc<dyn Embedder>) -> Pipeline {
        Pipeline::new(store, embedder, &Config::minimal("unused.sqlite"))
    }

    #[tokio::test]
    async fn test_processes_to_terminal_success() {
        let store = seeded("Clause one.\n\nClause two.\n\nClause three.").await;
        let p = pipeline(store.clone(), Arc::new(FallbackEmbedder::new()));

        let outcome = p.process("doc-1").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Processed {
                chunks: 3,
                chunk_failures: 0
            }
        );

        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, Status::Processed);
        assert_eq!(doc.embedding.as_ref().map(Vec::len), Some(384));
        assert_eq!(doc.chunks.len(), 3);
        assert!(doc.chunks.iter().all(|c| c.embedding.is_some()));
    }

    #[tokio::test]
    async fn test_document_embedding_failure_marks_error() {
        let store = seeded("Some text.").await;
        let p = pipeline(store.clone(), Arc::new(DownEmbedder));

        let outcome = p.process("doc-1").await.unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));

        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, Status::Error);
        assert!(doc.embedding.is_none());
        assert!(doc.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_failure_is_tolerated() {
        let store = seeded("Good clause.\n\nThe poison clause.\n\nAnother good clause.").await;
        let p = pipeline(store.clone(), Arc::new(PickyEmbedder));

        let outcome = p.process("doc-1").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Processed {
                chunks: 3,
                chunk_failures: 1
            }
        );

        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, Status::Processed);
        assert!(doc.chunks[0].embedding.is_some());
        assert!(doc.chunks[1].embedding.is_none());
        assert!(doc.chunks[2].embedding.is_some());
    }

    #[tokio::test]
    async fn test_missing_document_is_silent() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline(store, Arc::new(FallbackEmbedder::new()));
        assert_eq!(p.process("nope").await.unwrap(), Outcome::Missing);
    }

    #[tokio::test]
    async fn test_parallel_chunk_embedding_preserves_order() {
        let content = (0..12)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let store = seeded(&content).await;
        let mut cfg = Config::minimal("unused.sqlite");
        cfg.pipeline.chunk_concurrency = 4;
        let p = Pipeline::new(store.clone(), Arc::new(FallbackEmbedder::new()), &cfg);

        p.process("doc-1").await.unwrap();
        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        let fallback = FallbackEmbedder::new();
        for chunk in &doc.chunks {
            let expected = fallback.embed(&chunk.content).await.unwrap();
            assert_eq!(chunk.embedding.as_ref(), Some(&expected));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_process_runs_on_spawned_task() {
        let store = seeded("Recital.\n\nOperative part.\n\nCosts.").await;
        let mut cfg = Config::minimal("unused.sqlite");
        cfg.pipeline.chunk_concurrency = 3;
        let p = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(FallbackEmbedder::new()),
            &cfg,
        ));

        let handle = tokio::spawn({
            let p = Arc::clone(&p);
            async move { p.process("doc-1").await }
        });
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            Outcome::Processed {
                chunks: 3,
                chunk_failures: 0
            }
        );
        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert!(doc.chunks.iter().all(|c| c.embedding.is_some()));
    }

    #[tokio::test]
    async fn test_reprocess_reaches_terminal_again() {
        let store = seeded("Alpha.\n\nBeta.").await;
        let p = pipeline(store.clone(), Arc::new(FallbackEmbedder::new()));
        p.process("doc-1").await.unwrap();

        store.set_status("doc-1", Status::Pending).await.unwrap();
        let outcome = p.process("doc-1").await.unwrap();
        assert_eq!(outcome.status(), Some(Status::Processed));
        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.chunks.len(), 2);
    }
}
