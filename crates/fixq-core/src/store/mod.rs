//! Store trait - persistence boundary for the failing-test queue.
//!
//! The queue, grouping and retry layers only ever talk to [`QueueStore`].
//! Two backends implement it:
//!
//! - [`SqliteStore`]: the durable one, a single `SQLite` table accessed through `sqlx`
//! - [`MemoryStore`]: an ordered map plus a priority index behind one async mutex
//!
//! # Contract
//!
//! - `upsert` is insert-or-merge: a new path gets `failure_count = 1`; an existing
//!   path gets `failure_count + 1`, `last_failure = now`, `max(priority)` and keeps
//!   its stored context unless a new one is supplied. Grouping metadata is untouched.
//! - `requeue` is `upsert` with a carried count, so a dequeued item that comes back
//!   keeps counting from where it left off.
//! - Ordering everywhere is `priority DESC, created_at ASC, id ASC`.
//! - `take_next` and `take_group` resolve and delete as one unit.
//! - After `close`, every operation fails with [`Error::StoreClosed`](crate::Error::StoreClosed).

mod memory;
mod sqlite;

use chrono::{DateTime, SecondsFormat, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::{
    item::{ExecutionGroup, GroupMember, GroupType, QueueItem},
    Error, Result,
};

/// Persistence boundary for queue rows and their grouping metadata.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // ITEM OPERATIONS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert a new row or merge into the existing row for `file_path`.
    async fn upsert(
        &self,
        file_path: &str,
        priority: i64,
        error_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueueItem>;

    /// Put a previously taken item back, carrying its failure history.
    ///
    /// Merges like [`Self::upsert`], except the resulting `failure_count` is at
    /// least `item.failure_count + 1` even when no live row exists.
    async fn requeue(
        &self,
        item: &QueueItem,
        error_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueueItem>;

    /// Point lookup by path.
    async fn get(&self, file_path: &str) -> Result<Option<QueueItem>>;

    /// All rows in dequeue order.
    async fn list(&self) -> Result<Vec<QueueItem>>;

    /// Rows whose path contains `pattern` literally, in dequeue order.
    async fn search(&self, pattern: &str) -> Result<Vec<QueueItem>>;

    /// The row `take_next` would delete.
    async fn peek_next(&self) -> Result<Option<QueueItem>>;

    /// Select and delete the first row in dequeue order.
    async fn take_next(&self) -> Result<Option<QueueItem>>;

    /// Delete by path; returns whether a row existed.
    async fn remove(&self, file_path: &str) -> Result<bool>;

    /// Delete every row; returns how many were removed.
    async fn clear(&self) -> Result<u64>;

    /// Number of rows.
    async fn count(&self) -> Result<usize>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // GROUP OPERATIONS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Drop all grouping metadata, then write `members`. Returns the member
    /// paths that have no row.
    async fn replace_groups(&self, members: &[GroupMember]) -> Result<Vec<String>>;

    /// Drop the metadata of `group_ids` only, then write `members`. Returns the
    /// member paths that have no row.
    async fn merge_groups(&self, group_ids: &[i64], members: &[GroupMember])
        -> Result<Vec<String>>;

    /// Null the grouping fields on every row; returns rows touched.
    async fn clear_groups(&self) -> Result<u64>;

    /// Lowest live `group_id` with its members in `group_order`.
    async fn peek_group(&self) -> Result<Option<ExecutionGroup>>;

    /// Resolve the group `peek_group` would return and delete all its members.
    async fn take_group(&self) -> Result<Option<ExecutionGroup>>;

    /// `(group_id, group_type)` for every live group, ascending by id.
    async fn group_types(&self) -> Result<Vec<(i64, GroupType)>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // LIFECYCLE
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Release the backing resources. Later calls fail with `StoreClosed`.
    async fn close(&self) -> Result<()>;
}

/// Encode a timestamp with fixed microsecond precision so that text order
/// matches chronological order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("Invalid timestamp '{raw}': {e}")))
}
