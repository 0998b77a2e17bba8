//! Jest output parser

use std::path::Path;

use regex::Regex;

use super::{compile, has_any, Framework, OutputParser};
use crate::Result;

const MARKERS: &[&str] = &[
    "jest.config.js",
    "jest.config.ts",
    "jest.config.mjs",
    "jest.config.cjs",
    "package.json",
];

const PATTERNS: &[&str] = &[
    // suite header: " FAIL  src/math.test.js"
    r"^\s*FAIL\s+(?P<file>\S+\.[cm]?[jt]sx?)\b",
    // stack frame: "at Object.<anonymous> (src/math.test.js:10:5)"
    r"^\s*at .*\((?P<file>[^\s():]+\.test\.[cm]?[jt]sx?):\d+:\d+\)",
];

#[derive(Debug, Clone)]
pub struct JestParser {
    patterns: Vec<Regex>,
}

impl JestParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: compile(PATTERNS)?,
        })
    }
}

impl OutputParser for JestParser {
    fn framework(&self) -> Framework {
        Framework::Jest
    }

    fn detect(&self, project_root: &Path) -> bool {
        has_any(project_root, MARKERS)
    }

    fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}
