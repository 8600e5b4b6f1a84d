//! Per-owner staged uploads.
//!
//! An owner stages one upload at a time: extraction runs under a
//! cancellation handle, the extracted text is cached until the owner
//! submits it, and cancelling removes the cached text and the handle
//! together. A single mutex guards both so they can never disagree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;

use crate::store::now_ts;

/// Extracted text waiting for `submit_staged`.
#[derive(Debug, Clone, Serialize)]
pub struct StagedUpload {
    pub filename: String,
    pub format: String,
    #[serde(skip_serializing)]
    pub text: String,
    pub chars: usize,
    pub staged_at: i64,
}

impl StagedUpload {
    pub fn new(filename: String, format: String, text: String) -> Self {
        Self {
            chars: text.chars().count(),
            filename,
            format,
            text,
            staged_at: now_ts(),
        }
    }
}

struct Entry {
    generation: u64,
    upload: Option<StagedUpload>,
    cancel: Option<watch::Sender<bool>>,
}

/// Handle returned by [`SessionRegistry::begin`]; resolves when the
/// staging run is cancelled or superseded.
pub struct StagingTicket {
    pub generation: u64,
    cancelled: watch::Receiver<bool>,
}

impl StagingTicket {
    /// Completes once the run is cancelled. Never completes otherwise.
    pub async fn cancelled(&mut self) {
        if *self.cancelled.borrow() {
            return;
        }
        while self.cancelled.changed().await.is_ok() {
            if *self.cancelled.borrow() {
                return;
            }
        }
        // Sender dropped without cancelling: the entry was replaced or
        // finished. Only an explicit cancel should end the run early.
        std::future::pending::<()>().await
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Start a staging run for `owner`, cancelling any run in progress and
    /// discarding any previously staged text.
    pub fn begin(&self, owner: &str) -> StagingTicket {
        let generation = self.bump_generation();
        let (tx, rx) = watch::channel(false);

        let mut entries = self.entries();
        if let Some(previous) = entries.insert(
            owner.to_string(),
            Entry {
                generation,
                upload: None,
                cancel: Some(tx),
            },
        ) {
            if let Some(cancel) = previous.cancel {
                let _ = cancel.send(true);
            }
        }

        StagingTicket {
            generation,
            cancelled: rx,
        }
    }

    /// Cache the extracted text for the run identified by `generation`.
    /// Returns `false` if that run was cancelled or superseded.
    pub fn finish(&self, owner: &str, generation: u64, upload: StagedUpload) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(owner) {
            Some(entry) if entry.generation == generation => {
                entry.upload = Some(upload);
                entry.cancel = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the entry of a failed run, if it is still the current one.
    pub fn abandon(&self, owner: &str, generation: u64) {
        let mut entries = self.entries();
        if entries
            .get(owner)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(owner);
        }
    }

    /// Remove and return the staged upload for `owner`.
    pub fn take(&self, owner: &str) -> Option<StagedUpload> {
        let mut entries = self.entries();
        let entry = entries.get_mut(owner)?;
        let upload = entry.upload.take()?;
        if entry.cancel.is_none() {
            entries.remove(owner);
        }
        Some(upload)
    }

    pub fn peek(&self, owner: &str) -> Option<StagedUpload> {
        self.entries()
            .get(owner)
            .and_then(|entry| entry.upload.clone())
    }

    /// Cancel any run in progress and drop staged text for `owner`.
    /// Returns `false` if there was nothing to cancel.
    pub fn cancel(&self, owner: &str) -> bool {
        let removed = self.entries().remove(owner);
        match removed {
            Some(entry) => {
                if let Some(cancel) = entry.cancel {
                    let _ = cancel.send(true);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
