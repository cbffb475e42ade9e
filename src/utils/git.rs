//! Read-only git access: repository root discovery and blob lookup.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Working tree root of the repository containing `dir`, if any.
pub fn find_root(dir: &Path) -> Option<PathBuf> {
    let dir = dir.canonicalize().ok()?;
    let repo = gix::discover(&dir).ok()?;
    repo.path().parent().map(Path::to_path_buf)
}

/// Content of `rel` (relative to the repository root) at revision `rev`.
///
/// `Ok(None)` when the file does not exist at that revision; an unknown
/// revision is an error.
pub fn read_blob(root: &Path, rev: &str, rel: &Path) -> Result<Option<String>> {
    let repo = gix::open(root)
        .with_context(|| format!("not a git repository: {}", root.display()))?;
    let commit = repo
        .rev_parse_single(rev)
        .with_context(|| format!("unknown revision `{rev}`"))?;
    let spec = format!("{commit}:{}", rel.to_string_lossy().replace('\\', "/"));

    let Ok(id) = repo.rev_parse_single(spec.as_str()) else {
        return Ok(None);
    };
    let object = id.object().context("failed to read git object")?;
    Ok(Some(String::from_utf8_lossy(&object.data).into_owned()))
}
