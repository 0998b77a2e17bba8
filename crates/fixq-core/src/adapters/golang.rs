//! `go test` output parser

use std::path::Path;

use regex::Regex;

use super::{compile, has_any, Framework, OutputParser};
use crate::Result;

const MARKERS: &[&str] = &["go.mod"];

const PATTERNS: &[&str] = &[
    // t.Errorf location: "    calc_test.go:12: expected 4, got 5"
    r"^\s+(?P<file>[\w./-]+_test\.go):\d+:",
];

#[derive(Debug, Clone)]
pub struct GoParser {
    patterns: Vec<Regex>,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: compile(PATTERNS)?,
        })
    }
}

impl OutputParser for GoParser {
    fn framework(&self) -> Framework {
        Framework::Go
    }

    fn detect(&self, project_root: &Path) -> bool {
        has_any(project_root, MARKERS)
    }

    fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_error_locations() -> Result<()> {
        let parser = GoParser::new()?;
        let output = "\
--- FAIL: TestAdd (0.00s)
    calc_test.go:12: expected 4, got 5
    calc_test.go:15: expected 0, got 1
FAIL
FAIL\texample.com/calc\t0.002s";
        let failures = parser.parse_output(output);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].file_path, "calc_test.go");
        assert_eq!(failures[0].diagnostic.lines().count(), 2);
        Ok(())
    }
}
