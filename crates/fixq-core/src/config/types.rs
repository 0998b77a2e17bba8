//! Configuration structures, defaults, merging and validation

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{adapters::Framework, retry::RetryPolicy, Error, Result};

/// Value of `scan.framework` that asks for detection.
pub const AUTO_FRAMEWORK: &str = "auto";

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Queue database, relative paths resolve against the project root
    pub database: String,
    pub retry: RetryConfig,
    pub scan: ScanConfig,
    pub repair: RepairConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// `auto` or a framework name
    pub framework: String,
    /// Empty means the framework's default command
    pub command: String,
    pub default_priority: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Repair command template; `{file}` expands to the quoted path
    pub command: String,
    /// Empty means the framework's default verify command
    pub verify_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: ".fixq/queue.db".to_string(),
            retry: RetryConfig::default(),
            scan: ScanConfig::default(),
            repair: RepairConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: RetryPolicy::default().max_retries,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            framework: AUTO_FRAMEWORK.to_string(),
            command: String::new(),
            default_priority: 0,
        }
    }
}

/// One config file as written: every key optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub database: Option<String>,
    #[serde(default)]
    pub retry: RetryLayer,
    #[serde(default)]
    pub scan: ScanLayer,
    #[serde(default)]
    pub repair: RepairLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryLayer {
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanLayer {
    pub framework: Option<String>,
    pub command: Option<String>,
    pub default_priority: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairLayer {
    pub command: Option<String>,
    pub verify_command: Option<String>,
}

impl Config {
    /// Apply a layer on top of this config; keys present in `layer` win.
    pub fn merge(self, layer: ConfigLayer) -> Self {
        Self {
            database: layer.database.unwrap_or(self.database),
            retry: RetryConfig {
                max_retries: layer.retry.max_retries.unwrap_or(self.retry.max_retries),
            },
            scan: ScanConfig {
                framework: layer.scan.framework.unwrap_or(self.scan.framework),
                command: layer.scan.command.unwrap_or(self.scan.command),
                default_priority: layer
                    .scan
                    .default_priority
                    .unwrap_or(self.scan.default_priority),
            },
            repair: RepairConfig {
                command: layer.repair.command.unwrap_or(self.repair.command),
                verify_command: layer
                    .repair
                    .verify_command
                    .unwrap_or(self.repair.verify_command),
            },
        }
    }

    /// Apply `FIXQ_*` overrides read through `lookup`.
    pub fn apply_env<F>(self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_retries = lookup("FIXQ_MAX_RETRIES")
            .map(|value| {
                value.trim().parse::<u32>().map_err(|e| {
                    Error::Config(format!("Invalid FIXQ_MAX_RETRIES value '{value}': {e}"))
                })
            })
            .transpose()?;
        let default_priority = lookup("FIXQ_DEFAULT_PRIORITY")
            .map(|value| {
                value.trim().parse::<i64>().map_err(|e| {
                    Error::Config(format!("Invalid FIXQ_DEFAULT_PRIORITY value '{value}': {e}"))
                })
            })
            .transpose()?;

        Ok(self.merge(ConfigLayer {
            database: lookup("FIXQ_DATABASE"),
            retry: RetryLayer { max_retries },
            scan: ScanLayer {
                default_priority,
                ..ScanLayer::default()
            },
            repair: RepairLayer::default(),
        }))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(Error::Config("database path cannot be empty".to_string()));
        }
        if self.retry.max_retries < 1 {
            return Err(Error::Config("retry.max_retries must be at least 1".to_string()));
        }
        self.framework().map(|_| ())
    }

    /// The configured framework, `None` for `auto`.
    pub fn framework(&self) -> Result<Option<Framework>> {
        let name = self.scan.framework.trim();
        if name.eq_ignore_ascii_case(AUTO_FRAMEWORK) {
            return Ok(None);
        }
        name.to_ascii_lowercase()
            .parse::<Framework>()
            .map(Some)
            .map_err(|_| {
                Error::Config(format!(
                    "Unknown scan.framework '{name}' (expected auto, pytest, jest, go or cargo)"
                ))
            })
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_retries)
    }

    /// Database location, resolved against `project_root` when relative.
    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        let path = Path::new(&self.database);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        }
    }
}
