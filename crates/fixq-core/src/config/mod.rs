//! Configuration loading
//!
//! # Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Built-in defaults
//! 2. Global config: `~/.config/fixq/config.toml`
//! 3. Project config: `.fixq/config.toml`, or the file given with `--config`
//! 4. Environment variables: `FIXQ_DATABASE`, `FIXQ_MAX_RETRIES`, `FIXQ_DEFAULT_PRIORITY`
//! 5. CLI flags (applied by the binary)
//!
//! # Example Config
//!
//! ```toml
//! database = ".fixq/queue.db"
//!
//! [retry]
//! max_retries = 3
//!
//! [scan]
//! framework = "pytest"
//! default_priority = 1
//!
//! [repair]
//! command = "my-fixer --file {file}"
//! ```

mod load;
mod types;

#[cfg(test)]
mod tests;

pub use load::{global_config_path, load_config, load_toml_file, project_config_path};
pub use types::{
    Config, ConfigLayer, RepairConfig, RepairLayer, RetryConfig, RetryLayer, ScanConfig, ScanLayer,
    AUTO_FRAMEWORK,
};
