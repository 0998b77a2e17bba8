//! pytest output parser

use std::path::Path;

use regex::Regex;

use super::{compile, has_any, Framework, OutputParser};
use crate::Result;

const MARKERS: &[&str] = &["pytest.ini", "conftest.py", "pyproject.toml", "setup.cfg", "tox.ini"];

const PATTERNS: &[&str] = &[
    // short test summary: "FAILED tests/test_x.py::test_y - AssertionError"
    r"^(?:FAILED|ERROR)\s+(?P<file>[^\s:]+\.py)(?:::\S+)?",
    // traceback location: "tests/test_x.py:12: AssertionError"
    r"^(?P<file>[^\s:]+\.py):\d+:\s+\w+",
];

#[derive(Debug, Clone)]
pub struct PytestParser {
    patterns: Vec<Regex>,
}

impl PytestParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: compile(PATTERNS)?,
        })
    }
}

impl OutputParser for PytestParser {
    fn framework(&self) -> Framework {
        Framework::Pytest
    }

    fn detect(&self, project_root: &Path) -> bool {
        has_any(project_root, MARKERS)
    }

    fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}
