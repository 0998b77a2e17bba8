//! Retry policy for automated repair attempts
//!
//! After a fix attempt the [`RetryCoordinator`] decides whether the file goes
//! back into the queue (with the new diagnostic folded into its context) or
//! is dropped because it already failed as often as the policy allows.

use serde::{Deserialize, Serialize};

use crate::{item::QueueItem, queue::QueueManager, Error, Result};

/// Retry ceiling used when nothing is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How many failures an item may accumulate before the loop gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Whether an item with `failure_count` failures must not be requeued.
    #[must_use]
    pub fn is_exhausted(&self, failure_count: i64) -> bool {
        failure_count >= i64::from(self.max_retries)
    }
}

/// What happened to an item after a repair attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum RetryOutcome {
    /// Verification passed; the item stays out of the queue
    Resolved { file_path: String },
    /// Verification failed; the item is back in the queue
    Requeued {
        file_path: String,
        failure_count: i64,
    },
}

/// Combine the context carried so far with a new verification diagnostic.
#[must_use]
pub fn merge_context(prior: Option<&str>, diagnostic: &str) -> String {
    match prior.filter(|prior| !prior.is_empty()) {
        Some(prior) => format!("Previous attempt: {prior}\n\nVerification failed: {diagnostic}"),
        None => format!("Verification failed: {diagnostic}"),
    }
}

/// Applies a [`RetryPolicy`] through [`QueueManager`] operations.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    queue: QueueManager,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub const fn new(queue: QueueManager, policy: RetryPolicy) -> Self {
        Self { queue, policy }
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record a fix attempt whose verification still fails.
    ///
    /// `item` may be a dequeued snapshot or a peeked row. The live row wins
    /// when present so counts reflect merges made in between; a snapshot is
    /// requeued with its count carried forward, so the ceiling holds either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetryCeilingExceeded`] once the item has failed
    /// `max_retries` times. The item is no longer queued in that case.
    pub async fn record_failure(&self, item: &QueueItem, diagnostic: &str) -> Result<RetryOutcome> {
        let current = self
            .queue
            .get(&item.file_path)
            .await?
            .unwrap_or_else(|| item.clone());

        if self.policy.is_exhausted(current.failure_count) {
            self.queue.remove(&current.file_path).await?;
            tracing::warn!(
                file_path = %current.file_path,
                failure_count = current.failure_count,
                max_retries = self.policy.max_retries,
                "retry ceiling reached, dropping test"
            );
            return Err(Error::RetryCeilingExceeded {
                file_path: current.file_path,
                failure_count: current.failure_count,
                max_retries: self.policy.max_retries,
            });
        }

        let context = merge_context(current.error_context.as_deref(), diagnostic);
        let requeued = self.queue.requeue(&current, Some(&context)).await?;
        tracing::info!(
            file_path = %requeued.file_path,
            failure_count = requeued.failure_count,
            "repair failed verification, requeued"
        );
        Ok(RetryOutcome::Requeued {
            file_path: requeued.file_path,
            failure_count: requeued.failure_count,
        })
    }

    /// Record a fix attempt that passed verification.
    pub async fn record_success(&self, item: &QueueItem) -> Result<RetryOutcome> {
        self.queue.remove(&item.file_path).await?;
        tracing::info!(file_path = %item.file_path, "test fixed");
        Ok(RetryOutcome::Resolved {
            file_path: item.file_path.clone(),
        })
    }
}
