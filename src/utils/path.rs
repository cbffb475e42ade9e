//! Path helpers shared by the renderer, watcher and status checks.

use std::path::{Component, Path, PathBuf};

/// Check if a link is external (has a scheme like http:, mailto:, etc.)
#[inline]
pub fn is_external_link(link: &str) -> bool {
    link.find(':').is_some_and(|pos| {
        pos > 0
            && link[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Check if path is a temp/backup file (editor artifacts).
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with("#")
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}

/// Link target from `from_dir` to `to`, always `/`-separated.
///
/// Both paths should be absolute (canonicalized).
///
/// `/docs/guide` → `/docs/api/b.md` = `api/b.md`
/// `/docs/api` → `/docs/a.md` = `../a.md`
pub fn relative_url(from_dir: &Path, to: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let target: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let ups = std::iter::repeat_n("..".to_owned(), from.len() - common);
    let downs = target[common..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    ups.chain(downs).collect::<Vec<_>>().join("/")
}

/// `path` relative to `root`, or `path` itself when outside of it.
pub fn display_relative(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_external_link() {
        assert!(is_external_link("https://example.com"));
        assert!(is_external_link("mailto:a@b.c"));
        assert!(!is_external_link("b.md"));
        assert!(!is_external_link("../docs/b.md"));
        assert!(!is_external_link(":odd.md"));
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("notes.md~")));
        assert!(is_temp_file(Path::new(".notes.md.swp")));
        assert!(is_temp_file(Path::new("#notes.md#")));
        assert!(!is_temp_file(Path::new("notes.md")));
    }

    #[test]
    fn test_relative_url() {
        assert_eq!(relative_url(Path::new("/d"), Path::new("/d/a.md")), "a.md");
        assert_eq!(
            relative_url(Path::new("/d/api"), Path::new("/d/a.md")),
            "../a.md"
        );
        assert_eq!(
            relative_url(Path::new("/d/x/y"), Path::new("/d/z/a.md")),
            "../../z/a.md"
        );
        assert_eq!(
            relative_url(Path::new("/d"), Path::new("/d/sub/a.md")),
            "sub/a.md"
        );
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(
            display_relative(Path::new("/r/docs/a.md"), Path::new("/r")),
            PathBuf::from("docs/a.md")
        );
        assert_eq!(
            display_relative(Path::new("/x/a.md"), Path::new("/r")),
            PathBuf::from("/x/a.md")
        );
    }
}
