//! Shell command execution
//!
//! Test runs, repair commands and verification commands all go through
//! [`run_shell`]: the user's shell, `-c`, captured output.

use std::{path::Path, process::Stdio};

use tokio::process::Command;

use crate::{Error, Result};

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout followed by stderr, the way a terminal would show them.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Convert a non-zero exit into [`Error::Command`].
    pub fn require_success(self, command: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::Command {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// The user's shell from `SHELL`, or `sh` when unset or blank.
fn user_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| "sh".to_string())
}

/// Run `command` through the user's shell in `cwd` with extra `env` vars.
///
/// A non-zero exit is reported in [`CommandOutput::success`], not as an error.
///
/// # Errors
///
/// Returns [`Error::Command`] if the shell cannot be spawned.
pub async fn run_shell(command: &str, cwd: &Path, env: &[(&str, &str)]) -> Result<CommandOutput> {
    let shell = user_shell();
    tracing::debug!(%shell, command, cwd = %cwd.display(), "running shell command");

    let output = Command::new(&shell)
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::Command {
            command: command.to_string(),
            exit_code: None,
            stderr: format!("failed to spawn {shell}: {e}"),
        })?;

    let result = CommandOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!(command, exit_code = ?result.exit_code, "shell command finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_status() -> Result<()> {
        let dir = TempDir::new()?;
        let ok = run_shell("echo hello", dir.path(), &[]).await?;
        assert!(ok.success);
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = run_shell("echo oops >&2; exit 7", dir.path(), &[]).await?;
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(7));
        assert_eq!(failed.stderr.trim(), "oops");
        assert!(matches!(
            failed.require_success("exit 7"),
            Err(Error::Command { exit_code: Some(7), .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_passes_environment_and_cwd() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("marker.txt"), "x")?;
        let out = run_shell(
            "ls marker.txt && printf '%s' \"$FIXQ_TEST_VAR\"",
            dir.path(),
            &[("FIXQ_TEST_VAR", "value")],
        )
        .await?;
        assert!(out.success);
        assert!(out.stdout.contains("marker.txt"));
        assert!(out.stdout.ends_with("value"));
        Ok(())
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            success: false,
            exit_code: Some(1),
            stdout: "out".into(),
            stderr: "err".into(),
        };
        assert_eq!(out.combined(), "out\nerr");
    }
}
