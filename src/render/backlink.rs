//! Backlink propagation.
//!
//! Rendering `a.md` that links to `b.md` makes sure `b.md` ends with a
//! backlinks section pointing back:
//!
//! ```text
//! --- BACKLINKS ---
//! [See B](a.md "codebook:backlink")
//! ```
//!
//! Each target is an independent read-modify-write. Failures are logged and
//! never affect the source document.

use crate::{
    debug, log,
    markup::{reference::render_backlink, scanner::BACKLINK},
    utils::{
        git,
        path::{is_external_link, relative_url},
    },
};
use std::{
    borrow::Cow,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const MARKER: &str = "--- BACKLINKS ---";

#[derive(Debug, Error)]
pub enum BacklinkError {
    #[error("failed to read backlink target `{0}`")]
    Read(PathBuf, #[source] io::Error),

    #[error("failed to write backlink target `{0}`")]
    Write(PathBuf, #[source] io::Error),
}

/// A `[label](url)` pair taken from the source document.
#[derive(Debug, Clone, Copy)]
pub struct CrossLink<'a> {
    pub label: &'a str,
    pub url: &'a str,
}

/// Map a link URL to an existing file.
///
/// `/`-rooted URLs resolve against `repo_root` when known, everything else
/// against `source_dir`. External and missing targets yield `None`.
pub fn resolve_target(source_dir: &Path, url: &str, repo_root: Option<&Path>) -> Option<PathBuf> {
    if is_external_link(url) {
        return None;
    }
    let decoded = urlencoding::decode(url).unwrap_or(Cow::Borrowed(url));
    let candidate = match decoded.strip_prefix('/') {
        Some(rooted) => repo_root.unwrap_or(source_dir).join(rooted),
        None => source_dir.join(decoded.as_ref()),
    };
    candidate.canonicalize().ok().filter(|p| p.is_file())
}

/// Is `line` a closing fence for a block opened with `ch`: only fence
/// characters, at least three of them, no info string.
fn closes_fence(line: &str, ch: char) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == ch)
}

/// The live marker line: byte offset just past its line ending, and that
/// ending (`""` when the marker is the last line).
///
/// The marker must be alone on its line and outside fenced code blocks; the
/// last such line wins. An unclosed fence runs to the end of the document.
pub fn find_marker(content: &str) -> Option<(usize, &str)> {
    let mut fence: Option<char> = None;
    let mut found = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        offset += line.len();
        let body = line.trim_end_matches(['\n', '\r']);
        let trimmed = body.trim();

        match fence {
            Some(ch) => {
                if closes_fence(trimmed, ch) {
                    fence = None;
                }
            }
            None if trimmed.starts_with("```") => fence = Some('`'),
            None if trimmed.starts_with("~~~") => fence = Some('~'),
            None if trimmed == MARKER => found = Some((offset, &line[body.len()..])),
            None => {}
        }
    }
    found
}

/// Whether `section` already holds a backlink to `url` or to a file named
/// `source_name` (in any directory).
fn has_entry(section: &str, url: &str, source_name: &str) -> bool {
    BACKLINK.captures_iter(section).any(|caps| {
        let existing = caps.get(2).map_or("", |m| m.as_str());
        existing == url || existing.rsplit('/').next() == Some(source_name)
    })
}

/// New target content with `entry` added, or `None` when already present.
pub fn insert_entry(content: &str, entry: &str, url: &str, source_name: &str) -> Option<String> {
    match find_marker(content) {
        Some((at, eol)) => {
            if has_entry(&content[at..], url, source_name) {
                return None;
            }
            if eol.is_empty() {
                Some(format!("{content}\n{entry}"))
            } else {
                Some(format!("{}{entry}{eol}{}", &content[..at], &content[at..]))
            }
        }
        None => Some(format!("{}\n\n{MARKER}\n{entry}\n", content.trim_end())),
    }
}

/// Add a backlink to `source` in one target. Returns whether the file changed.
fn update_target(
    target: &Path,
    source: &Path,
    source_name: &str,
    label: &str,
) -> Result<bool, BacklinkError> {
    let content =
        fs::read_to_string(target).map_err(|e| BacklinkError::Read(target.to_path_buf(), e))?;

    let target_dir = target.parent().unwrap_or(Path::new("/"));
    let url = relative_url(target_dir, source);
    let entry = render_backlink(label, &url);

    let Some(updated) = insert_entry(&content, &entry, &url, source_name) else {
        return Ok(false);
    };
    fs::write(target, updated).map_err(|e| BacklinkError::Write(target.to_path_buf(), e))?;
    Ok(true)
}

/// Ensure every link target of `source` links back. Returns the number of
/// target files written.
pub fn propagate(source: &Path, links: &[CrossLink<'_>]) -> usize {
    let Ok(source) = source.canonicalize() else {
        return 0;
    };
    let Some(source_dir) = source.parent() else {
        return 0;
    };
    let source_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let repo_root = links
        .iter()
        .any(|l| l.url.starts_with('/'))
        .then(|| git::find_root(source_dir))
        .flatten();

    let mut updated = 0;
    for link in links {
        let Some(target) = resolve_target(source_dir, link.url, repo_root.as_deref()) else {
            debug!("backlink"; "no target for {}", link.url);
            continue;
        };
        // A self-link would rewrite the document being rendered
        if target == source {
            continue;
        }

        match update_target(&target, &source, &source_name, link.label) {
            Ok(true) => {
                log!("backlink"; "{} <- {}", target.display(), source_name);
                updated += 1;
            }
            Ok(false) => {}
            Err(err) => log!("error"; "{:#}", anyhow::Error::new(err)),
        }
    }
    updated
}
