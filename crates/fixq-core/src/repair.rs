//! Automated repair loop
//!
//! The loop peeks the next failing test, asks a [`RepairAgent`] to fix it,
//! asks a [`Verifier`] whether the fix holds, and hands the verdict to the
//! [`RetryCoordinator`]. Working from `peek` means the row stays queued while
//! the attempt runs, so a crash mid-attempt loses nothing and every failed
//! attempt bumps `failure_count` through the normal merge path.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    item::QueueItem,
    queue::QueueManager,
    retry::{RetryCoordinator, RetryOutcome},
    runner::run_shell,
    Error, Result,
};

/// Placeholder replaced by the file path in command templates.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Environment variable carrying the accumulated error context.
pub const CONTEXT_ENV: &str = "FIXQ_ERROR_CONTEXT";

/// Environment variable carrying the file path; `{file}` expands to it.
pub const FILE_ENV: &str = "FIXQ_FILE";

/// What an agent reports after trying to fix a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAttempt {
    /// Whether the agent changed anything
    pub applied: bool,
    pub summary: String,
}

/// Result of re-running a test after a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub passed: bool,
    pub diagnostic: String,
}

/// Something that can attempt to fix a failing test.
#[async_trait::async_trait]
pub trait RepairAgent: Send + Sync {
    async fn attempt(&self, item: &QueueItem) -> Result<RepairAttempt>;
}

/// Something that can tell whether a test passes now.
#[async_trait::async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, file_path: &str) -> Result<Verification>;
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum RepairOutcome {
    Fixed,
    Requeued { failure_count: i64 },
    GaveUp { failure_count: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub file_path: String,
    pub outcome: RepairOutcome,
}

/// Totals over a [`RepairLoop::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
    pub fixed: usize,
    pub requeued: usize,
    pub gave_up: usize,
    pub reports: Vec<RepairReport>,
}

impl RepairSummary {
    fn record(&mut self, report: RepairReport) {
        match report.outcome {
            RepairOutcome::Fixed => self.fixed += 1,
            RepairOutcome::Requeued { .. } => self.requeued += 1,
            RepairOutcome::GaveUp { .. } => self.gave_up += 1,
        }
        self.reports.push(report);
    }
}

/// Drives repair attempts over the queue.
pub struct RepairLoop<'a> {
    queue: &'a QueueManager,
    retry: &'a RetryCoordinator,
    agent: &'a dyn RepairAgent,
    verifier: &'a dyn Verifier,
}

impl<'a> RepairLoop<'a> {
    pub fn new(
        queue: &'a QueueManager,
        retry: &'a RetryCoordinator,
        agent: &'a dyn RepairAgent,
        verifier: &'a dyn Verifier,
    ) -> Self {
        Self {
            queue,
            retry,
            agent,
            verifier,
        }
    }

    /// Process the next queued test. Returns `None` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<RepairReport>> {
        let Some(item) = self.queue.peek_item().await? else {
            return Ok(None);
        };
        tracing::info!(
            file_path = %item.file_path,
            failure_count = item.failure_count,
            "attempting repair"
        );

        let attempt = self.agent.attempt(&item).await?;
        let verification = if attempt.applied {
            self.verifier.verify(&item.file_path).await?
        } else {
            Verification {
                passed: false,
                diagnostic: attempt.summary,
            }
        };

        let outcome = if verification.passed {
            self.retry.record_success(&item).await.map(|_| RepairOutcome::Fixed)
        } else {
            match self.retry.record_failure(&item, &verification.diagnostic).await {
                Ok(RetryOutcome::Requeued { failure_count, .. }) => {
                    Ok(RepairOutcome::Requeued { failure_count })
                }
                Ok(RetryOutcome::Resolved { .. }) => Ok(RepairOutcome::Fixed),
                Err(Error::RetryCeilingExceeded { failure_count, .. }) => {
                    Ok(RepairOutcome::GaveUp { failure_count })
                }
                Err(e) => Err(e),
            }
        }?;

        Ok(Some(RepairReport {
            file_path: item.file_path,
            outcome,
        }))
    }

    /// Repeat [`Self::run_once`] until the queue drains or `limit` reports exist.
    pub async fn run(&self, limit: usize) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();
        while summary.reports.len() < limit {
            match self.run_once().await? {
                Some(report) => summary.record(report),
                None => break,
            }
        }
        tracing::info!(
            fixed = summary.fixed,
            requeued = summary.requeued,
            gave_up = summary.gave_up,
            "repair loop finished"
        );
        Ok(summary)
    }
}

/// Expand `{file}` to a quoted reference to [`FILE_ENV`].
///
/// The path itself never becomes shell syntax, so spaces and metacharacters
/// in queued paths reach the command as one literal argument.
fn render(template: &str) -> String {
    template.replace(FILE_PLACEHOLDER, &format!("\"${FILE_ENV}\""))
}

/// Repair agent that runs a shell command per file.
///
/// The command sees the file via `{file}` (or `FIXQ_FILE`) and the context so
/// far in `FIXQ_ERROR_CONTEXT`. A zero exit counts as an applied change.
#[derive(Debug, Clone)]
pub struct ShellRepairAgent {
    command: String,
    cwd: PathBuf,
}

impl ShellRepairAgent {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait::async_trait]
impl RepairAgent for ShellRepairAgent {
    async fn attempt(&self, item: &QueueItem) -> Result<RepairAttempt> {
        let command = render(&self.command);
        let context = item.error_context.as_deref().unwrap_or_default();
        let env = [(FILE_ENV, item.file_path.as_str()), (CONTEXT_ENV, context)];
        let output = run_shell(&command, &self.cwd, &env).await?;
        let summary = if output.success {
            output.stdout.trim().to_string()
        } else {
            format!("repair command exited with {:?}: {}", output.exit_code, output.combined().trim())
        };
        Ok(RepairAttempt {
            applied: output.success,
            summary,
        })
    }
}

/// Verifier that re-runs a test command for one file.
#[derive(Debug, Clone)]
pub struct ShellVerifier {
    command: String,
    cwd: PathBuf,
}

impl ShellVerifier {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait::async_trait]
impl Verifier for ShellVerifier {
    async fn verify(&self, file_path: &str) -> Result<Verification> {
        let command = render(&self.command);
        let output = run_shell(&command, &self.cwd, &[(FILE_ENV, file_path)]).await?;
        Ok(Verification {
            passed: output.success,
            diagnostic: output.combined().trim().to_string(),
        })
    }
}
