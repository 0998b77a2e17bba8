//! Configuration loading from files and environment

use std::path::{Path, PathBuf};

use super::types::{Config, ConfigLayer};
use crate::{Error, Result};

/// Load configuration from all sources.
///
/// `explicit` replaces the project config file and must exist.
///
/// # Errors
///
/// Returns error if:
/// - A config file cannot be read or is malformed TOML
/// - An environment override does not parse
/// - The merged values fail validation
pub fn load_config(project_root: &Path, explicit: Option<&Path>) -> Result<Config> {
    let config = Config::default();

    let config = match global_config_path().filter(|path| path.exists()) {
        Some(path) => config.merge(load_toml_file(&path)?),
        None => config,
    };

    let config = match explicit {
        Some(path) => config.merge(load_toml_file(path)?),
        None => {
            let project = project_config_path(project_root);
            if project.exists() {
                config.merge(load_toml_file(&project)?)
            } else {
                config
            }
        }
    };

    let config = config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Get path to the global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fixq")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Get path to the project config file
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".fixq").join("config.toml")
}

/// Read one TOML file into a layer.
pub fn load_toml_file(path: &Path) -> Result<ConfigLayer> {
    if path.is_dir() {
        return Err(Error::Config(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("Failed to read config file {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))
}
