//! Error types for fixq-core
//!
//! Errors fall into four groups, each with its own exit code:
//!
//! - **Validation** (exit 1): empty paths, malformed plans, bad config
//! - **System** (exit 2): IO and shelled-out commands
//! - **Storage** (exit 4): anything the SQLite engine reports, plus use after close
//! - **Policy** (exit 5): the retry ceiling
//!
//! An empty queue is not an error. Operations that can find nothing return
//! `Option`, `bool` or an empty `Vec` and the CLI maps that to exit code 3.

use thiserror::Error;

/// Exit code used by the CLI for "nothing to do" outcomes.
pub const EXIT_NOTHING_TO_DO: i32 = 3;

/// Core error type for fixq operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Empty or missing required input, rejected before any mutation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file or value is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input could not be parsed (plan JSON, timestamps, enum values)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Underlying store failure, propagated verbatim
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The store was closed and can no longer serve requests
    #[error("Storage failure: store is closed")]
    StoreClosed,

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(String),

    /// A shelled-out command could not run or exited non-zero where success was required
    #[error("Command '{command}' failed (exit code {exit_code:?}): {stderr}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The item already failed as often as the retry policy allows
    #[error(
        "Retry ceiling exceeded for '{file_path}': failed {failure_count} time(s), max retries {max_retries}"
    )]
    RetryCeilingExceeded {
        file_path: String,
        failure_count: i64,
        max_retries: u32,
    },
}

impl Error {
    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage error tagged with the operation that failed.
    pub fn storage(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{operation}: {err}"))
    }

    /// Returns true for errors raised by the store itself.
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::StoreClosed)
    }

    /// Returns the exit code the CLI uses for this error.
    ///
    /// - 1: invalid input or configuration
    /// - 2: IO or external command
    /// - 4: storage failure
    /// - 5: retry ceiling exceeded
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::Config(_) | Self::Parse(_) => 1,
            Self::Io(_) | Self::Command { .. } => 2,
            Self::Storage(_) | Self::StoreClosed => 4,
            Self::RetryCeilingExceeded { .. } => 5,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => Self::StoreClosed,
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config: {err}"))
    }
}

/// Result type alias for fixq-core operations
pub type Result<T> = std::result::Result<T, Error>;
