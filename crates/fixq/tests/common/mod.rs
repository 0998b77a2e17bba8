//! Shared harness for CLI tests: an isolated project directory per test.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

pub struct TestHarness {
    _dir: TempDir,
    root: PathBuf,
}

impl TestHarness {
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        // The binary sees the canonical cwd; compare against the same form.
        let root = dir.path().canonicalize()?;
        Ok(Self { _dir: dir, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db(&self) -> PathBuf {
        self.root().join("state").join("queue.db")
    }

    /// `fixq` with the working directory, config home and database pinned
    /// inside the temp dir.
    pub fn fixq(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fixq"));
        cmd.current_dir(self.root())
            .env("HOME", self.root())
            .env("XDG_CONFIG_HOME", self.root().join("xdg"))
            .env_remove("FIXQ_DATABASE")
            .env_remove("FIXQ_MAX_RETRIES")
            .env_remove("FIXQ_DEFAULT_PRIORITY")
            .env_remove("FIXQ_LOG")
            .env_remove("RUST_LOG")
            .env("SHELL", "sh")
            .arg("--db")
            .arg(self.db())
            .args(args);
        cmd
    }

    /// Run and parse the single JSON object printed on stdout.
    pub fn json(&self, args: &[&str]) -> (Option<i32>, serde_json::Value) {
        let mut full = args.to_vec();
        full.push("--json");
        let output = self.fixq(&full).output().ok();
        let code = output.as_ref().and_then(|o| o.status.code());
        let value = output
            .and_then(|o| serde_json::from_slice(&o.stdout).ok())
            .unwrap_or(serde_json::Value::Null);
        (code, value)
    }

    pub fn path(&self, file: &str) -> String {
        self.root().join(file).to_string_lossy().into_owned()
    }

    pub fn write(&self, file: &str, contents: &str) -> std::io::Result<()> {
        let path = self.root().join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }
}
