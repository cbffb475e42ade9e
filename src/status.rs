//! Read-only health report for markdown files.
//!
//! Flags broken cross-file links, markup the guard would refuse to render,
//! `<exec>` blocks in languages nothing can run, and `<cicada>` blocks that
//! could never produce a valid request.

use crate::{
    markup::{Markup, frontmatter, guard, scan, scanner::line_of},
    render::{backlink::resolve_target, collect_markdown},
    resolve::cicada::ENDPOINTS,
    utils::{git, path::is_external_link},
};
use anyhow::Result;
use colored::Colorize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    /// 1-based; 0 when the issue concerns the whole file
    pub line: usize,
    pub message: String,
}

impl Issue {
    fn error(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message: message.into(),
        }
    }

    fn warning(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };
        if self.line > 0 {
            write!(f, "{label} line {}: {}", self.line, self.message)
        } else {
            write!(f, "{label}: {}", self.message)
        }
    }
}

#[derive(Debug)]
pub struct FileStatus {
    pub path: PathBuf,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub files: Vec<FileStatus>,
    /// Service name and whether its health check passed
    pub probes: Vec<(&'static str, bool)>,
}

impl StatusReport {
    fn count(&self, severity: Severity) -> usize {
        self.files
            .iter()
            .flat_map(|f| &f.issues)
            .filter(|i| i.severity == severity)
            .count()
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error) + self.probes.iter().filter(|(_, ok)| !ok).count()
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// 2 with any error, 1 with only warnings, 0 when clean.
    pub fn exit_code(&self) -> i32 {
        if self.errors() > 0 {
            2
        } else if self.warnings() > 0 {
            1
        } else {
            0
        }
    }

    /// Human readable report, paths shown relative to `root`.
    pub fn print(&self, root: &Path) {
        for file in self.files.iter().filter(|f| !f.issues.is_empty()) {
            let rel = file.path.strip_prefix(root).unwrap_or(&file.path);
            println!("{}", rel.display().to_string().bold());
            for issue in &file.issues {
                println!("  {issue}");
            }
        }
        for (name, healthy) in &self.probes {
            let state = if *healthy {
                "healthy".green()
            } else {
                "unreachable".red()
            };
            println!("{name}: {state}");
        }
        println!(
            "{} files checked, {} errors, {} warnings",
            self.files.len(),
            self.errors(),
            self.warnings()
        );
    }
}

/// Description of the attributes `endpoint` is missing, if any.
fn missing_params(endpoint: &str, attributes: &[(String, String)]) -> Option<&'static str> {
    let has = |name: &str| attributes.iter().any(|(n, v)| n == name && !v.is_empty());
    match endpoint {
        "query" if !has("keywords") && !has("pattern") => Some("`keywords` or `pattern`"),
        "search-function" if !has("function_name") => Some("`function_name`"),
        "search-module" if !has("module_name") && !has("file_path") => {
            Some("`module_name` or `file_path`")
        }
        _ => None,
    }
}

/// Issues in one document. `path` anchors relative link targets.
pub fn check_content(path: &Path, content: &str, repo_root: Option<&Path>) -> Vec<Issue> {
    let (_, body_start) = frontmatter::parse(content);
    let body = &content[body_start..];
    let line = |offset: usize| line_of(content, body_start + offset);
    let source_dir = path.parent().unwrap_or(Path::new("."));
    let mut issues = Vec::new();

    if let Some(incomplete) = guard::find_incomplete(body) {
        issues.push(Issue::error(
            line(incomplete.offset),
            format!("incomplete markup: {incomplete}"),
        ));
    }

    for reference in scan(body) {
        let at = line(reference.span.start);
        match &reference.markup {
            Markup::MarkdownLink { path: url, .. } => {
                if !is_external_link(url) && resolve_target(source_dir, url, repo_root).is_none() {
                    issues.push(Issue::error(at, format!("broken link: {url}")));
                }
            }
            Markup::Exec { lang, .. } if lang != "python" => {
                issues.push(Issue::warning(at, format!("unsupported exec language `{lang}`")));
            }
            Markup::Query {
                endpoint,
                attributes,
                ..
            } => {
                if !ENDPOINTS.contains(&endpoint.as_str()) {
                    issues.push(Issue::error(at, format!("unknown cicada endpoint `{endpoint}`")));
                } else if let Some(needed) = missing_params(endpoint, attributes) {
                    issues.push(Issue::error(at, format!("`{endpoint}` requires {needed}")));
                }
            }
            _ => {}
        }
    }

    issues.sort_by_key(|i| i.line);
    issues
}

fn check_file(path: &Path, repo_root: Option<&Path>) -> FileStatus {
    let issues = match fs::read_to_string(path) {
        Ok(content) => check_content(path, &content, repo_root),
        Err(err) => vec![Issue::error(0, format!("cannot read file: {err}"))],
    };
    FileStatus {
        path: path.to_path_buf(),
        issues,
    }
}

/// Check a single file or every markdown file under a directory.
pub fn check_path(path: &Path, recursive: bool, excluded: Option<&Path>) -> Result<StatusReport> {
    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        collect_markdown(path, recursive, excluded)?
    };
    let dir = if path.is_file() {
        path.parent().unwrap_or(Path::new("."))
    } else {
        path
    };
    let repo_root = git::find_root(dir);

    Ok(StatusReport {
        files: files
            .iter()
            .map(|f| check_file(f, repo_root.as_deref()))
            .collect(),
        probes: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn messages(issues: &[Issue]) -> Vec<(Severity, usize, &str)> {
        issues
            .iter()
            .map(|i| (i.severity, i.line, i.message.as_str()))
            .collect()
    }

    #[test]
    fn test_broken_and_valid_links() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.md"), "").unwrap();
        let path = dir.path().join("a.md");
        let content = "[B](b.md)\n\n[Gone](gone.md)\n[Web](https://example.com/x.md)\n";

        let issues = check_content(&path, content, None);
        assert_eq!(messages(&issues), vec![(Severity::Error, 3, "broken link: gone.md")]);
    }

    #[test]
    fn test_line_numbers_count_frontmatter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        let content = "---\ntitle: x\n---\n[Gone](gone.md)\n";

        let issues = check_content(&path, content, None);
        assert_eq!(issues[0].line, 4);
    }

    #[test]
    fn test_exec_language_warning() {
        let content = "<exec lang=\"bash\">\nls\n</exec>\n<output>\n</output>\n";
        let issues = check_content(Path::new("a.md"), content, None);
        assert_eq!(
            messages(&issues),
            vec![(Severity::Warning, 1, "unsupported exec language `bash`")]
        );
    }

    #[test]
    fn test_cicada_checks() {
        let content = "<cicada endpoint=\"nope\">\n</cicada>\n\
                       <cicada endpoint=\"search-function\">\n</cicada>\n\
                       <cicada keywords=\"auth\">\n</cicada>\n\
                       <cicada endpoint=\"search-module\" file_path=\"lib/a.ex\">\n</cicada>\n";
        let issues = check_content(Path::new("a.md"), content, None);
        assert_eq!(
            messages(&issues),
            vec![
                (Severity::Error, 1, "unknown cicada endpoint `nope`"),
                (Severity::Error, 3, "`search-function` requires `function_name`"),
            ]
        );
    }

    #[test]
    fn test_incomplete_markup() {
        let content = "text\n<exec lang=\"python\">\nx = 1\n";
        let issues = check_content(Path::new("a.md"), content, None);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].line, 2);
    }

    #[test]
    fn test_exit_codes() {
        let mut report = StatusReport::default();
        assert_eq!(report.exit_code(), 0);

        report.files.push(FileStatus {
            path: PathBuf::from("a.md"),
            issues: vec![Issue::warning(1, "w")],
        });
        assert_eq!(report.exit_code(), 1);

        report.probes.push(("backend", false));
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn test_check_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "[B](b.md)").unwrap();
        fs::write(dir.path().join("b.md"), "fine").unwrap();

        let report = check_path(dir.path(), true, None).unwrap();
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.errors(), 0);

        let single = check_path(&dir.path().join("a.md"), true, None).unwrap();
        assert_eq!(single.files.len(), 1);
    }
}
