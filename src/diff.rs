//! Diff generator: what would rendering change, compared to a git revision.
//!
//! Both sides go through [`Renderer::render_content`], so the diff shows the
//! edits made since `rev` with live values filled in on both sides. Nothing
//! is written and no backlinks are touched.

use crate::{
    exec,
    markup::frontmatter,
    render::Renderer,
    utils::{exec::GIT_FILTER, git},
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Concatenated diff of a directory plus the files that could not be diffed.
#[derive(Debug, Default)]
pub struct DiffReport {
    pub diff: String,
    pub failed: Vec<(PathBuf, String)>,
}

/// Body rendered, frontmatter kept as is.
fn render_text(renderer: &mut Renderer, content: &str) -> String {
    let (_, body_start) = frontmatter::parse(content);
    let (head, body) = content.split_at(body_start);
    let (rendered, _) = renderer.render_content(body);
    format!("{head}{rendered}")
}

/// Unified diff of two texts, labelled `a/{rel}` and `b/{rel}`.
fn unified_diff(rel: &Path, old: &str, new: &str) -> Result<String> {
    if old == new {
        return Ok(String::new());
    }

    let dir = TempDir::new().context("Failed to create temp dir")?;
    let a = Path::new("a").join(rel);
    let b = Path::new("b").join(rel);
    for (side, text) in [(&a, old), (&b, new)] {
        let path = dir.path().join(side);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
    }

    // Exit status 1 means the files differ
    let output = exec!(
        ok=&[0, 1];
        filter=&GIT_FILTER;
        dir.path();
        ["git"];
        "diff", "--no-index", "--no-color", "--no-prefix", "--", &a, &b
    )?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Diff the rendered working copy of `path` against its rendered content at `rev`.
///
/// A file missing from `rev` diffs against an empty text.
pub fn diff_file(renderer: &mut Renderer, path: &Path, rev: &str) -> Result<String> {
    let path = path
        .canonicalize()
        .with_context(|| format!("File not found: {}", path.display()))?;
    let dir = path.parent().unwrap_or(Path::new("/"));
    let root = git::find_root(dir)
        .with_context(|| format!("{} is not inside a git repository", path.display()))?;
    let rel = path.strip_prefix(&root).unwrap_or(&path).to_path_buf();

    let current =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let committed = git::read_blob(&root, rev, &rel)?.unwrap_or_default();

    let new = render_text(renderer, &current);
    let old = render_text(renderer, &committed);
    unified_diff(&rel, &old, &new)
}

/// Diff every markdown file under `dir`; per-file failures are collected.
pub fn diff_directory(
    renderer: &mut Renderer,
    dir: &Path,
    recursive: bool,
    rev: &str,
) -> Result<DiffReport> {
    let files = renderer.collect_files(dir, recursive)?;
    let mut report = DiffReport::default();

    for file in files {
        match diff_file(renderer, &file, rev) {
            Ok(diff) => report.diff.push_str(&diff),
            Err(err) => report.failed.push((file, format!("{err:#}"))),
        }
    }
    Ok(report)
}

/// Rendered content of `path` without writing it.
pub fn show_rendered(renderer: &mut Renderer, path: &Path) -> Result<String> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(render_text(renderer, &content))
}
