//! fixq-core - Durable failing-test queue
//!
//! This crate provides:
//! - A priority queue of failing test files backed by `SQLite` ([`QueueManager`])
//! - Execution groups layered onto queued items ([`GroupingEngine`])
//! - Retry policy for automated repair attempts ([`RetryCoordinator`], [`RepairLoop`])
//! - Framework adapters that turn test-runner output into queue entries
//! - Configuration loading
//!
//! Everything is constructed explicitly and shares a store through
//! `Arc<dyn QueueStore>`:
//!
//! ```no_run
//! use std::sync::Arc;
//! use fixq_core::{GroupingEngine, QueueManager, QueueStore, SqliteStore};
//!
//! # async fn example() -> fixq_core::Result<()> {
//! let store: Arc<dyn QueueStore> = Arc::new(SqliteStore::open(".fixq/queue.db").await?);
//! let queue = QueueManager::new(Arc::clone(&store));
//! let groups = GroupingEngine::new(store);
//!
//! queue.enqueue("/repo/tests/test_calc.py", 5, Some("AssertionError")).await?;
//! groups.set_execution_groups(&[vec!["/repo/tests/test_calc.py".to_string()]]).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod grouping;
pub mod item;
pub mod queue;
pub mod repair;
pub mod retry;
pub mod runner;
pub mod store;

pub use error::{Error, Result, EXIT_NOTHING_TO_DO};
pub use grouping::GroupingEngine;
pub use item::{
    ExecutionGroup, GroupAssignment, GroupMember, GroupSpec, GroupStats, GroupType, QueueItem,
    QueueStats,
};
pub use queue::{QueueManager, DEFAULT_PRIORITY};
pub use repair::{
    RepairAgent, RepairAttempt, RepairLoop, RepairOutcome, RepairReport, RepairSummary,
    ShellRepairAgent, ShellVerifier, Verification, Verifier,
};
pub use retry::{merge_context, RetryCoordinator, RetryOutcome, RetryPolicy};
pub use store::{MemoryStore, QueueStore, SqliteStore};
