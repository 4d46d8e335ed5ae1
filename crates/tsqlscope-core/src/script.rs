//! One input script: its path and either its syntax tree or the reason it failed to parse

use std::path::{Path, PathBuf};

use crate::syntax::{parse_script, ParseFailure, SyntaxTree};

#[derive(Debug)]
pub struct Script {
    path: PathBuf,
    result: Result<SyntaxTree, ParseFailure>,
}

impl Script {
    /// Parse `source`; a failure is kept rather than returned so the run can report it
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Self {
        let path = path.into();
        let result = parse_script(source);
        if let Err(failure) = &result {
            tracing::debug!(path = %path.display(), error = %failure, "script failed to parse");
        }
        Self { path, result }
    }

    /// Path relative to the analysis root, as reported in issues
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    pub fn tree(&self) -> Option<&SyntaxTree> {
        self.result.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&ParseFailure> {
        self.result.as_ref().err()
    }

    pub fn is_parsed(&self) -> bool {
        self.result.is_ok()
    }
}
