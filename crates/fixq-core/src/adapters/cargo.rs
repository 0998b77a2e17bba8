//! `cargo test` output parser

use std::path::Path;

use regex::Regex;

use super::{compile, has_any, Framework, OutputParser};
use crate::Result;

const MARKERS: &[&str] = &["Cargo.toml"];

const PATTERNS: &[&str] = &[
    // "thread 'tests::adds' panicked at src/calc.rs:21:9:"
    r"panicked at (?P<file>[^\s:]+\.rs):\d+:\d+",
    // compile errors inside tests: "  --> tests/calc.rs:4:5"
    r"^\s*-->\s+(?P<file>[^\s:]+\.rs):\d+:\d+",
];

#[derive(Debug, Clone)]
pub struct CargoParser {
    patterns: Vec<Regex>,
}

impl CargoParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: compile(PATTERNS)?,
        })
    }
}

impl OutputParser for CargoParser {
    fn framework(&self) -> Framework {
        Framework::Cargo
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
    fn test_parses_panic_locations() -> Result<()> {
        let parser = CargoParser::new()?;
        let output = "\
running 2 tests
test tests::adds ... FAILED
thread 'tests::adds' panicked at src/calc.rs:21:9:
assertion `left == right` failed
error[E0425]: cannot find value `x` in this scope
  --> tests/integration.rs:4:5";
        let files: Vec<_> = parser
            .parse_output(output)
            .into_iter()
            .map(|f| f.file_path)
            .collect();
        assert_eq!(files, vec!["src/calc.rs", "tests/integration.rs"]);
        Ok(())
    }
}
