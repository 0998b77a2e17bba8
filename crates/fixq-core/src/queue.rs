//! Failing-test queue
//!
//! [`QueueManager`] is the public face of the queue. It validates input,
//! stamps times, logs mutations and delegates storage to a [`QueueStore`].

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

use crate::{
    item::{QueueItem, QueueStats},
    store::QueueStore,
    Error, Result,
};

/// Priority used when the caller does not supply one.
pub const DEFAULT_PRIORITY: i64 = 0;

/// Current time at the precision the stores persist.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn validate_path(file_path: &str) -> Result<()> {
    if file_path.trim().is_empty() {
        return Err(Error::invalid_argument("file path must not be empty"));
    }
    Ok(())
}

/// Priority queue of failing test files.
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct QueueManager {
    store: Arc<dyn QueueStore>,
}

impl QueueManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// The store this manager writes to.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Add a failing file, or merge into its existing entry.
    ///
    /// A duplicate path increments `failure_count`, refreshes `last_failure`,
    /// keeps the higher priority and replaces the context only when a new one
    /// is given.
    pub async fn enqueue(
        &self,
        file_path: &str,
        priority: i64,
        error_context: Option<&str>,
    ) -> Result<QueueItem> {
        validate_path(file_path)?;
        let item = self
            .store
            .upsert(file_path, priority, error_context, now())
            .await?;

        if item.failure_count > 1 {
            tracing::info!(
                file_path,
                failure_count = item.failure_count,
                priority = item.priority,
                "test already queued, merged failure"
            );
        } else {
            tracing::debug!(file_path, priority = item.priority, "enqueued test");
        }
        Ok(item)
    }

    /// Put a previously dequeued or peeked item back with one more failure.
    ///
    /// The count continues from `item.failure_count`, so a dequeue/requeue
    /// cycle never resets it.
    pub async fn requeue(&self, item: &QueueItem, error_context: Option<&str>) -> Result<QueueItem> {
        validate_path(&item.file_path)?;
        let requeued = self.store.requeue(item, error_context, now()).await?;
        tracing::info!(
            file_path = %requeued.file_path,
            failure_count = requeued.failure_count,
            "requeued test"
        );
        Ok(requeued)
    }

    /// Remove and return the path of the next item.
    pub async fn dequeue(&self) -> Result<Option<String>> {
        Ok(self.dequeue_item().await?.map(|item| item.file_path))
    }

    /// Remove and return the next item.
    pub async fn dequeue_item(&self) -> Result<Option<QueueItem>> {
        let item = self.store.take_next().await?;
        if let Some(item) = &item {
            tracing::debug!(
                file_path = %item.file_path,
                failure_count = item.failure_count,
                "dequeued test"
            );
        }
        Ok(item)
    }

    /// Path of the item `dequeue` would return, without removing it.
    pub async fn peek(&self) -> Result<Option<String>> {
        Ok(self.peek_item().await?.map(|item| item.file_path))
    }

    /// The item `dequeue_item` would return, without removing it.
    pub async fn peek_item(&self) -> Result<Option<QueueItem>> {
        self.store.peek_next().await
    }

    /// Every item in dequeue order.
    pub async fn list(&self) -> Result<Vec<QueueItem>> {
        self.store.list().await
    }

    /// Look up one item by path.
    pub async fn get(&self, file_path: &str) -> Result<Option<QueueItem>> {
        self.store.get(file_path).await
    }

    /// Delete an item by path. Returns whether it was queued.
    pub async fn remove(&self, file_path: &str) -> Result<bool> {
        let removed = self.store.remove(file_path).await?;
        tracing::debug!(file_path, removed, "remove test");
        Ok(removed)
    }

    /// Delete every item. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let removed = self.store.clear().await?;
        tracing::debug!(removed, "cleared queue");
        Ok(removed)
    }

    pub async fn size(&self) -> Result<usize> {
        self.store.count().await
    }

    pub async fn contains(&self, file_path: &str) -> Result<bool> {
        Ok(self.store.get(file_path).await?.is_some())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// Items whose path contains `pattern` literally, in dequeue order.
    pub async fn search(&self, pattern: &str) -> Result<Vec<QueueItem>> {
        if pattern.is_empty() {
            return Err(Error::invalid_argument("search pattern must not be empty"));
        }
        self.store.search(pattern).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let items = self.store.list().await?;
        Ok(QueueStats::from_items(&items))
    }
}
