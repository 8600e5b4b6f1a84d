//! In-memory [`DocumentStore`] for tests.
//!
//! One `HashMap` behind `std::sync::RwLock`. Documents own their chunk
//! vectors directly, so every write replaces whole fields under a single
//! write guard.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{newest_first, now_ts, DocumentStore};
use crate::models::{Category, Chunk, CorpusStats, Document, Status};

pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Document>>> {
        self.docs.read().map_err(|_| anyhow!("document map lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Document>>> {
        self.docs.write().map_err(|_| anyhow!("document map lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_category(doc: &Document, category: Option<Category>) -> bool {
    category.map_or(true, |c| doc.category == c)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.write()?;
        if docs.contains_key(&doc.id) {
            anyhow::bail!("document {} already exists", doc.id);
        }
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn list_documents(
        &self,
        limit: i64,
        offset: i64,
        category: Option<Category>,
    ) -> Result<Vec<Document>> {
        let docs = self.read()?;
        let mut listed: Vec<Document> = docs
            .values()
            .filter(|d| matches_category(d, category))
            .map(|d| Document {
                chunks: Vec::new(),
                ..d.clone()
            })
            .collect();
        listed.sort_by(newest_first);

        Ok(listed
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    async fn set_status(&self, id: &str, status: Status) -> Result<bool> {
        let mut docs = self.write()?;
        match docs.get_mut(id) {
            Some(doc) => {
                doc.status = status;
                doc.updated_at = now_ts();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn complete_processing(
        &self,
        id: &str,
        embedding: &[f32],
        chunks: &[Chunk],
    ) -> Result<bool> {
        let mut docs = self.write()?;
        match docs.get_mut(id) {
            Some(doc) => {
                doc.embedding = Some(embedding.to_vec());
                doc.chunks = chunks.to_vec();
                doc.status = Status::Processed;
                doc.updated_at = now_ts();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed(&self, id: &str) -> Result<bool> {
        let mut docs = self.write()?;
        match docs.get_mut(id) {
            Some(doc) => {
                doc.embedding = None;
                doc.chunks.clear();
                doc.status = Status::Error;
                doc.updated_at = now_ts();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_documents(
        &self,
        category: Option<Category>,
        with_chunks: bool,
    ) -> Result<Vec<Document>> {
        let docs = self.read()?;
        let mut scanned: Vec<Document> = docs
            .values()
            .filter(|d| matches_category(d, category))
            .map(|d| {
                let mut doc = d.clone();
                if !with_chunks {
                    doc.chunks.clear();
                }
                doc
            })
            .collect();
        scanned.sort_by(newest_first);
        Ok(scanned)
    }

    async fn stats(&self) -> Result<CorpusStats> {
        let docs = self.read()?;
        let mut by_status: BTreeMap<String, i64> = BTreeMap::new();
        let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
        for doc in docs.values() {
            *by_status.entry(doc.status.to_string()).or_default() += 1;
            *by_category.entry(doc.category.to_string()).or_default() += 1;
        }

        Ok(CorpusStats {
            total: docs.len() as i64,
            by_status: by_status.into_iter().collect(),
            by_category: by_category.into_iter().collect(),
        })
    }

    async fn reset_stale(&self, older_than: i64) -> Result<Vec<String>> {
        let mut docs = self.write()?;
        let now = now_ts();
        let mut reset = Vec::new();
        for doc in docs.values_mut() {
            if doc.status == Status::Processing && doc.updated_at < older_than {
                doc.status = Status::Pending;
                doc.updated_at = now;
                reset.push(doc.id.clone());
            }
        }
        reset.sort();
        Ok(reset)
    }

    async fn pending_ids(&self) -> Result<Vec<String>> {
        let docs = self.read()?;
        let mut pending: Vec<&Document> = docs
            .values()
            .filter(|d| d.status == Status::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(pending.into_iter().map(|d| d.id.clone()).collect())
    }
}
