//! Test framework adapters
//!
//! Each supported framework has an [`OutputParser`] that knows how to detect
//! a project using it and how to pull failing test files out of the runner's
//! output. The queue never sees these types; [`scan`] hands it plain paths
//! plus the diagnostic text.

mod cargo;
mod golang;
mod jest;
mod pytest;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

pub use cargo::CargoParser;
pub use golang::GoParser;
pub use jest::JestParser;
pub use pytest::PytestParser;

use crate::{item::QueueItem, queue::QueueManager, runner::run_shell, Error, Result};

/// Supported test frameworks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Pytest,
    Jest,
    Go,
    Cargo,
}

/// A failing test file found in runner output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTest {
    /// Path as written by the runner
    pub file_path: String,
    /// The output line(s) that identified the failure
    pub diagnostic: String,
}

/// Framework-specific detection and output parsing.
pub trait OutputParser: Send + Sync {
    fn framework(&self) -> Framework;

    /// Whether `project_root` looks like a project using this framework.
    fn detect(&self, project_root: &Path) -> bool;

    /// Patterns applied line by line. Each has a `file` capture group.
    fn patterns(&self) -> &[Regex];

    /// Failing files in first-seen order, one entry per path.
    ///
    /// When a path matches on several lines the diagnostics are joined.
    fn parse_output(&self, output: &str) -> Vec<FailedTest> {
        let mut order: Vec<FailedTest> = Vec::new();
        let mut seen = HashSet::new();
        for line in output.lines() {
            let Some(file) = self
                .patterns()
                .iter()
                .find_map(|pattern| pattern.captures(line))
                .and_then(|caps| caps.name("file").map(|m| m.as_str().to_string()))
            else {
                continue;
            };
            let line = line.trim().to_string();
            if seen.insert(file.clone()) {
                order.push(FailedTest {
                    file_path: file,
                    diagnostic: line,
                });
            } else if let Some(existing) = order.iter_mut().find(|t| t.file_path == file) {
                existing.diagnostic.push('\n');
                existing.diagnostic.push_str(&line);
            }
        }
        order
    }
}

/// Compile a fixed set of patterns.
pub(crate) fn compile(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| Error::Parse(format!("Invalid pattern '{pattern}': {e}")))
        })
        .collect()
}

pub(crate) fn has_any(root: &Path, markers: &[&str]) -> bool {
    markers.iter().any(|marker| root.join(marker).exists())
}

/// Parser for a specific framework.
pub fn parser_for(framework: Framework) -> Result<Box<dyn OutputParser>> {
    Ok(match framework {
        Framework::Pytest => Box::new(PytestParser::new()?),
        Framework::Jest => Box::new(JestParser::new()?),
        Framework::Go => Box::new(GoParser::new()?),
        Framework::Cargo => Box::new(CargoParser::new()?),
    })
}

/// First framework whose markers exist under `project_root`.
pub fn detect_framework(project_root: &Path) -> Result<Option<Box<dyn OutputParser>>> {
    for framework in Framework::iter() {
        let parser = parser_for(framework)?;
        if parser.detect(project_root) {
            tracing::debug!(%framework, root = %project_root.display(), "detected framework");
            return Ok(Some(parser));
        }
    }
    Ok(None)
}

/// Command that runs the whole suite.
#[must_use]
pub const fn default_test_command(framework: Framework) -> &'static str {
    match framework {
        Framework::Pytest => "python -m pytest -rf",
        Framework::Jest => "npx jest --ci",
        Framework::Go => "go test ./...",
        Framework::Cargo => "cargo test --no-fail-fast",
    }
}

/// Command that re-runs only the tests in one file; `{file}` is substituted.
///
/// Go runs the package containing the file. Cargo has no per-file selector
/// for unit tests, so it has no default and needs `repair.verify_command`.
#[must_use]
pub const fn default_verify_command(framework: Framework) -> Option<&'static str> {
    match framework {
        Framework::Pytest => Some("python -m pytest {file}"),
        Framework::Jest => Some("npx jest --ci {file}"),
        Framework::Go => Some("cd \"$(dirname {file})\" && go test ."),
        Framework::Cargo => None,
    }
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub framework: Framework,
    pub command: String,
    pub exit_code: Option<i32>,
    pub enqueued: Vec<QueueItem>,
}

/// Resolve a runner path against the project root.
fn absolute(root: &Path, file_path: &str) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Run the test command and enqueue every failing file it reports.
pub async fn scan(
    queue: &QueueManager,
    parser: &dyn OutputParser,
    command: &str,
    root: &Path,
    priority: i64,
) -> Result<ScanReport> {
    let output = run_shell(command, root, &[]).await?;
    let failures = parser.parse_output(&output.combined());
    tracing::info!(
        framework = %parser.framework(),
        failures = failures.len(),
        exit_code = ?output.exit_code,
        "scanned test output"
    );

    let mut enqueued = Vec::with_capacity(failures.len());
    for failure in failures {
        let path = absolute(root, &failure.file_path);
        let item = queue
            .enqueue(&path.to_string_lossy(), priority, Some(&failure.diagnostic))
            .await?;
        enqueued.push(item);
    }

    Ok(ScanReport {
        framework: parser.framework(),
        command: command.to_string(),
        exit_code: output.exit_code,
        enqueued,
    })
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, sync::Arc};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        repair::{ShellVerifier, Verifier},
        store::MemoryStore,
    };

    #[test]
    fn test_framework_names() {
        assert_eq!(Framework::Go.to_string(), "go");
        assert_eq!(Framework::from_str("pytest").ok(), Some(Framework::Pytest));
        assert!(Framework::from_str("mocha").is_err());
    }

    #[test]
    fn test_detect_by_marker() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(detect_framework(dir.path())?.is_none());

        std::fs::write(dir.path().join("go.mod"), "module example.com/x\n")?;
        let parser = detect_framework(dir.path())?;
        assert_eq!(parser.map(|p| p.framework()), Some(Framework::Go));
        Ok(())
    }

    #[test]
    fn test_verify_commands_are_scoped_to_the_file() {
        for framework in Framework::iter() {
            match default_verify_command(framework) {
                Some(command) => assert!(command.contains("{file}"), "{framework}: {command}"),
                None => assert_eq!(framework, Framework::Cargo),
            }
        }
    }

    #[tokio::test]
    async fn test_go_verify_runs_in_the_package_directory() -> Result<()> {
        let dir = TempDir::new()?;
        let pkg = dir.path().join("pkg").join("calc");
        std::fs::create_dir_all(&pkg)?;
        std::fs::write(pkg.join("calc_test.go"), "package calc\n")?;

        let template = default_verify_command(Framework::Go)
            .ok_or_else(|| Error::invalid_argument("go has a verify command"))?
            .replace("go test .", "pwd");
        let verifier = ShellVerifier::new(template, dir.path());
        let verification = verifier.verify("pkg/calc/calc_test.go").await?;
        assert!(verification.passed);
        assert!(verification.diagnostic.ends_with("pkg/calc"));
        Ok(())
    }

    #[test]
    fn test_absolute_joins_relative_paths() {
        let root = Path::new("/repo");
        assert_eq!(absolute(root, "tests/a.py"), PathBuf::from("/repo/tests/a.py"));
        assert_eq!(absolute(root, "/elsewhere/b.py"), PathBuf::from("/elsewhere/b.py"));
    }

    #[tokio::test]
    async fn test_scan_enqueues_failures() -> Result<()> {
        let dir = TempDir::new()?;
        let queue = QueueManager::new(Arc::new(MemoryStore::new()));
        let parser = parser_for(Framework::Jest)?;

        let report = scan(
            &queue,
            parser.as_ref(),
            "echo 'FAIL src/a.test.js'; echo 'PASS src/b.test.js'; exit 1",
            dir.path(),
            2,
        )
        .await?;

        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.enqueued.len(), 1);
        let expected = dir.path().join("src/a.test.js");
        assert_eq!(
            report.enqueued[0].file_path,
            expected.to_string_lossy().as_ref()
        );
        assert_eq!(report.enqueued[0].priority, 2);
        assert_eq!(queue.size().await?, 1);
        Ok(())
    }
}
