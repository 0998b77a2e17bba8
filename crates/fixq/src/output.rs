//! Command results and how they are printed
//!
//! Every command produces one [`Report`]. Human mode prints its text; JSON
//! mode prints exactly one object:
//!
//! ```json
//! { "success": true, "command": "peek", "data": { ... } }
//! { "success": false, "command": "dequeue", "message": "Queue is empty" }
//! ```

use fixq_core::{QueueItem, EXIT_NOTHING_TO_DO};
use serde::Serialize;
use serde_json::{json, Value};

/// Exit code when a repair run gave up on at least one test.
const EXIT_GAVE_UP: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    /// Empty queue, no group, absent path
    NothingToDo,
    /// Completed, but some tests hit the retry ceiling
    GaveUp,
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub command: String,
    pub status: Status,
    /// Human-readable text
    pub text: String,
    pub data: Option<Value>,
}

impl Report {
    /// A successful result carrying `data`.
    pub fn done(
        command: &str,
        text: impl Into<String>,
        data: &impl Serialize,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            command: command.to_string(),
            status: Status::Done,
            text: text.into(),
            data: Some(serde_json::to_value(data)?),
        })
    }

    /// A "nothing to do" result.
    pub fn nothing(command: &str, text: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            status: Status::NothingToDo,
            text: text.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub const fn exit_code(&self) -> i32 {
        match self.status {
            Status::Done => 0,
            Status::NothingToDo => EXIT_NOTHING_TO_DO,
            Status::GaveUp => EXIT_GAVE_UP,
        }
    }

    pub fn to_json(&self) -> Value {
        match (&self.status, &self.data) {
            (Status::NothingToDo, _) | (_, None) => json!({
                "success": self.status != Status::NothingToDo,
                "command": self.command,
                "message": self.text,
            }),
            (_, Some(data)) => json!({
                "success": true,
                "command": self.command,
                "data": data,
            }),
        }
    }

    /// Text to print on stdout.
    pub fn render(&self, json: bool) -> String {
        if json {
            self.to_json().to_string()
        } else {
            self.text.clone()
        }
    }
}

/// JSON object for a failed command.
pub fn error_json(command: &str, message: &str, exit_code: i32) -> Value {
    json!({
        "success": false,
        "command": command,
        "message": message,
        "exitCode": exit_code,
    })
}

/// Shorten `s` to at most `max_len` characters, marking the cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    } else {
        s.to_string()
    }
}

/// Items as an aligned table.
pub fn item_table(items: &[QueueItem]) -> String {
    let header = format!("{:>8}  {:>8}  {:<6}  {}", "PRIORITY", "FAILURES", "GROUP", "PATH");
    let rows = items.iter().map(|item| {
        let group = item
            .group_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        format!(
            "{:>8}  {:>8}  {:<6}  {}",
            item.priority,
            item.failure_count,
            truncate(&group, 6),
            item.file_path
        )
    });
    std::iter::once(header).chain(rows).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("very long string", 8), "very lo…");
    }

    #[test]
    fn test_json_shapes() -> anyhow::Result<()> {
        let done = Report::done("size", "2", &2)?;
        assert_eq!(done.to_json(), json!({"success": true, "command": "size", "data": 2}));
        assert_eq!(done.exit_code(), 0);

        let empty = Report::nothing("dequeue", "Queue is empty");
        assert_eq!(
            empty.to_json(),
            json!({"success": false, "command": "dequeue", "message": "Queue is empty"})
        );
        assert_eq!(empty.exit_code(), 3);
        Ok(())
    }
}
