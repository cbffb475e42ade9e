//! Per-file render results.

use crate::markup::{Frontmatter, guard::Incomplete};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Fatal, per-file render errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] io::Error),

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] io::Error),

    #[error("not a directory: `{0}`")]
    NotADirectory(PathBuf),
}

/// Why a file was left alone this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// `disable: links` in frontmatter
    LinksDisabled,
    /// A tag is still being typed
    IncompleteMarkup(Incomplete),
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LinksDisabled => f.write_str("links disabled"),
            Self::IncompleteMarkup(incomplete) => write!(f, "incomplete markup: {incomplete}"),
        }
    }
}

/// Counts and status for one rendered file.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub path: PathBuf,
    pub templates_found: usize,
    pub templates_resolved: usize,
    pub code_blocks_found: usize,
    pub code_blocks_executed: usize,
    pub queries_found: usize,
    pub queries_executed: usize,
    pub backlinks_found: usize,
    pub backlinks_updated: usize,
    pub changed: bool,
    pub skipped: Option<Skip>,
    pub error: Option<RenderError>,
    pub frontmatter: Option<Frontmatter>,
}

impl RenderOutcome {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub(crate) fn failed(path: impl Into<PathBuf>, error: RenderError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(path)
        }
    }

    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// One-line summary of what was found and resolved.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.templates_found > 0 {
            parts.push(format!(
                "{}/{} templates",
                self.templates_resolved, self.templates_found
            ));
        }
        if self.code_blocks_found > 0 {
            parts.push(format!(
                "{}/{} code blocks",
                self.code_blocks_executed, self.code_blocks_found
            ));
        }
        if self.queries_found > 0 {
            parts.push(format!(
                "{}/{} queries",
                self.queries_executed, self.queries_found
            ));
        }
        if self.backlinks_updated > 0 {
            parts.push(format!("{} backlinks", self.backlinks_updated));
        }
        if parts.is_empty() {
            "no references".to_owned()
        } else {
            parts.join(", ")
        }
    }
}
