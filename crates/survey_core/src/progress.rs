use std::sync::Arc;

use storage::{KeyValueStore, Subscription};
use tracing::warn;

pub const TASK_PROGRESS_STORAGE_KEY: &str = "afterversed.taskProgress.segments";

/// Number of checklist segments the user has worked through, shared between
/// views through the local store.
pub struct TaskProgress<K: KeyValueStore + ?Sized> {
    store: Arc<K>,
}

impl<K: KeyValueStore + ?Sized> Clone for TaskProgress<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K: KeyValueStore + ?Sized> TaskProgress<K> {
    pub fn new(store: Arc<K>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> u32 {
        match self.store.get(TASK_PROGRESS_STORAGE_KEY).await {
            Ok(raw) => raw.as_deref().map_or(0, parse_count),
            Err(err) => {
                warn!(error = %err, "progress: read failed");
                0
            }
        }
    }

    /// Stores `count` clamped to a non-negative value and returns what was
    /// stored.
    pub async fn set(&self, count: i64) -> u32 {
        let sanitized = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        if let Err(err) = self
            .store
            .set(TASK_PROGRESS_STORAGE_KEY, &sanitized.to_string())
            .await
        {
            warn!(count = sanitized, error = %err, "progress: write failed");
        }
        sanitized
    }

    pub fn subscribe(&self) -> ProgressUpdates {
        ProgressUpdates {
            inner: self.store.subscribe(TASK_PROGRESS_STORAGE_KEY),
        }
    }
}

pub struct ProgressUpdates {
    inner: Subscription,
}

impl ProgressUpdates {
    /// Next stored count. A removed key reads as zero.
    pub async fn next(&mut self) -> Option<u32> {
        let change = self.inner.recv().await?;
        Some(change.value.as_deref().map_or(0, parse_count))
    }
}

/// Reads the leading integer of `raw`; anything negative or unparseable is 0.
pub fn parse_count(raw: &str) -> u32 {
    let raw = raw.trim();
    let unsigned = raw.strip_prefix('+').unwrap_or(raw);
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned[..digits_end].parse().unwrap_or(0)
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
