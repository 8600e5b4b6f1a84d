//! Bounded worker pool for the document pipeline.
//!
//! Submissions enqueue a document ID on a bounded `mpsc` channel read by a
//! fixed number of workers. An in-flight table guarantees each document is
//! queued or running at most once; a request that arrives while the
//! document is already in flight sets a rerun flag and the worker requeues
//! it when the current pass ends.
//!
//! Failures never cross back to the submitter. They are logged and counted
//! in [`PipelineStats`] for operators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::pipeline::{Outcome, Pipeline};
use crate::store::{now_ts, DocumentStore};

/// Operator-facing pool counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub workers: usize,
    /// Model identifier of the embedder the workers use.
    pub embedder: String,
    pub queued: usize,
    pub in_flight: usize,
    pub processed: u64,
    pub failed: u64,
    pub stale_resets: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Shared {
    /// Queued or running document IDs, mapped to the rerun flag.
    tracked: HashMap<String, bool>,
    stats: PipelineStats,
}

#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<String>,
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl IngestQueue {
    /// Spawn `config.workers` workers draining a channel of
    /// `config.queue_capacity` slots.
    pub fn start(pipeline: Arc<Pipeline>, config: &PipelineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shared = Arc::new(Mutex::new(Shared {
            stats: PipelineStats {
                workers: config.workers,
                embedder: pipeline.model_name().to_string(),
                ..PipelineStats::default()
            },
            ..Shared::default()
        }));

        let queue = Self { tx, shared };

        for worker in 0..config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let pipeline = Arc::clone(&pipeline);
            let queue = queue.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(id) = next else { break };
                    queue.run_one(worker, &pipeline, id).await;
                }
                tracing::debug!(worker, "pipeline worker stopped");
            });
        }

        queue
    }

    /// Schedule a pipeline pass for `id`.
    ///
    /// Returns `false` when the document was already queued or running; in
    /// that case one more pass is scheduled after the current one.
    pub async fn enqueue(&self, id: &str) -> bool {
        {
            let mut shared = lock(&self.shared);
            if let Some(rerun) = shared.tracked.get_mut(id) {
                *rerun = true;
                return false;
            }
            shared.tracked.insert(id.to_string(), false);
            shared.stats.queued += 1;
        }

        if self.tx.send(id.to_string()).await.is_err() {
            let mut shared = lock(&self.shared);
            shared.tracked.remove(id);
            shared.stats.queued = shared.stats.queued.saturating_sub(1);
            tracing::error!(document_id = %id, "pipeline queue closed, document left pending");
            return false;
        }
        true
    }

    async fn run_one(&self, worker: usize, pipeline: &Pipeline, id: String) {
        {
            let mut shared = lock(&self.shared);
            shared.stats.queued = shared.stats.queued.saturating_sub(1);
            shared.stats.in_flight += 1;
            if let Some(rerun) = shared.tracked.get_mut(&id) {
                *rerun = false;
            }
        }

        let result = pipeline.process(&id).await;

        let rerun = {
            let mut shared = lock(&self.shared);
            shared.stats.in_flight = shared.stats.in_flight.saturating_sub(1);
            match &result {
                Ok(Outcome::Processed { .. }) => shared.stats.processed += 1,
                Ok(Outcome::Failed(err)) => {
                    shared.stats.failed += 1;
                    shared.stats.last_error = Some(format!("{}: {}", id, err));
                }
                Ok(Outcome::Missing) => {}
                Err(err) => {
                    shared.stats.failed += 1;
                    shared.stats.last_error = Some(format!("{}: {:#}", id, err));
                }
            }

            let rerun = shared.tracked.get(&id).copied().unwrap_or(false);
            if rerun {
                shared.stats.queued += 1;
                if let Some(flag) = shared.tracked.get_mut(&id) {
                    *flag = false;
                }
            } else {
                shared.tracked.remove(&id);
            }
            rerun
        };

        if let Err(err) = result {
            tracing::error!(worker, document_id = %id, error = %err, "pipeline run failed");
        }

        if rerun {
            // Sending from a worker could block on a full channel while every
            // worker does the same, so hand the send to a detached task.
            let tx = self.tx.clone();
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                if tx.send(id.clone()).await.is_err() {
                    let mut shared = lock(&shared);
                    shared.tracked.remove(&id);
                    shared.stats.queued = shared.stats.queued.saturating_sub(1);
                }
            });
        }
    }

    pub fn stats(&self) -> PipelineStats {
        lock(&self.shared).stats.clone()
    }

    /// Enqueue every `pending` document in the store.
    pub async fn recover_pending(&self, store: &dyn DocumentStore) -> Result<usize> {
        let ids = store.pending_ids().await?;
        let mut scheduled = 0;
        for id in &ids {
            if self.enqueue(id).await {
                scheduled += 1;
            }
        }
        if scheduled > 0 {
            tracing::info!(count = scheduled, "recovered pending documents");
        }
        Ok(scheduled)
    }

    /// One staleness pass: reset documents stuck in `processing` for longer
    /// than `stale_after` and requeue them.
    pub async fn sweep_stale(
        &self,
        store: &dyn DocumentStore,
        stale_after: Duration,
    ) -> Result<Vec<String>> {
        let cutoff = now_ts() - stale_after.as_secs() as i64;
        let reset = store.reset_stale(cutoff).await?;

        if !reset.is_empty() {
            lock(&self.shared).stats.stale_resets += reset.len() as u64;
            for id in &reset {
                tracing::warn!(document_id = %id, "reset stale processing document to pending");
                self.enqueue(id).await;
            }
        }

        Ok(reset)
    }

    /// Run [`sweep_stale`](Self::sweep_stale) every `sweep_interval_secs`.
    pub fn spawn_sweeper(
        &self,
        store: Arc<dyn DocumentStore>,
        config: &PipelineConfig,
    ) -> JoinHandle<()> {
        let queue = self.clone();
        let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
        let stale_after = Duration::from_secs(config.stale_after_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = queue.sweep_stale(store.as_ref(), stale_after).await {
                    tracing::error!(error = %err, "staleness sweep failed");
                }
            }
        })
    }

    /// Wait until nothing is queued or running, or `timeout` elapses.
    /// Returns whether the pool went idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if lock(&self.shared).tracked.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
