//! Rendering orchestrator.
//!
//! # Pipeline (per file)
//!
//! ```text
//! read ─► frontmatter ─► guard ─► scan ─► templates ─► exec ─► cicada ─► backlinks ─► write
//!           │ links off    │ incomplete
//!           └──── skip ────┘
//! ```
//!
//! Frontmatter is carried through byte-for-byte; only the body is rewritten.
//! Per-file failures end up in the [`RenderOutcome`], never as a panic or an
//! early return from a directory render.

pub mod backlink;
pub mod code;
pub mod outcome;
pub mod query;

pub use outcome::{RenderError, RenderOutcome, Skip};

use crate::{
    debug,
    logger::ProgressBar,
    markup::{
        Kind, Markup, Values, find_templates, frontmatter, guard, replace_values, scan,
        scanner::of_kind, template_keys,
    },
    resolve::{CodeExecutor, QueryExecutor, TemplateResolver, is_local, resolve_local},
    utils::path::is_markdown,
};
use backlink::CrossLink;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub struct Renderer {
    resolver: Box<dyn TemplateResolver>,
    executor: Option<Box<dyn CodeExecutor>>,
    queries: Option<Box<dyn QueryExecutor>>,
    excluded_dir: Option<PathBuf>,
}

impl Renderer {
    pub fn new(resolver: Box<dyn TemplateResolver>) -> Self {
        Self {
            resolver,
            executor: None,
            queries: None,
            excluded_dir: None,
        }
    }

    /// Run `<exec>` blocks with `executor`.
    pub fn with_executor(mut self, executor: Box<dyn CodeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Run `<cicada>` blocks with `queries`.
    pub fn with_queries(mut self, queries: Box<dyn QueryExecutor>) -> Self {
        self.queries = Some(queries);
        self
    }

    /// Skip `dir` (and everything below it) in directory renders.
    pub fn exclude_dir(mut self, dir: &Path) -> Self {
        self.excluded_dir = Some(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));
        self
    }

    /// Local keys in-process, the rest in one batch.
    fn resolve(&mut self, keys: &[String]) -> Values {
        let (local, remote): (Vec<String>, Vec<String>) =
            keys.iter().cloned().partition(|key| is_local(key));

        let mut values = resolve_local(&local);
        if !remote.is_empty() {
            values.extend(self.resolver.resolve_batch(&remote));
        }
        values
    }

    /// Substitute template values in `text` without touching the filesystem.
    ///
    /// Exec and query blocks are left as they are.
    pub fn render_content(&mut self, text: &str) -> (String, Values) {
        let keys = find_templates(text);
        if keys.is_empty() {
            return (text.to_owned(), Values::default());
        }
        let values = self.resolve(&keys);
        (replace_values(text, &values), values)
    }

    pub fn render_file(&mut self, path: &Path, dry_run: bool) -> RenderOutcome {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return RenderOutcome::failed(path, RenderError::Read(path.to_path_buf(), e)),
        };
        let mut outcome = RenderOutcome::new(path);

        let (frontmatter, body_start) = frontmatter::parse(&content);
        let backlinks_disabled = frontmatter.backlinks_disabled();
        let links_disabled = frontmatter.links_disabled();
        outcome.frontmatter = Some(frontmatter);
        if links_disabled {
            debug!("render"; "links disabled in {}", path.display());
            outcome.skipped = Some(Skip::LinksDisabled);
            return outcome;
        }

        let (head, body) = content.split_at(body_start);
        if let Some(incomplete) = guard::find_incomplete(body) {
            debug!("render"; "skipping {}: {incomplete}", path.display());
            outcome.skipped = Some(Skip::IncompleteMarkup(incomplete));
            return outcome;
        }

        let refs = scan(body);
        let keys = template_keys(&refs);
        let links: Vec<CrossLink<'_>> = refs
            .iter()
            .filter_map(|r| match &r.markup {
                Markup::MarkdownLink { label, path } => Some(CrossLink { label, url: path }),
                _ => None,
            })
            .collect();
        outcome.templates_found = keys.len();
        outcome.code_blocks_found = of_kind(&refs, Kind::Exec).count();
        outcome.queries_found = of_kind(&refs, Kind::Query).count();
        outcome.backlinks_found = links.len();

        let mut rendered = body.to_owned();
        if !keys.is_empty() {
            let values = self.resolve(&keys);
            outcome.templates_resolved = values.len();
            rendered = replace_values(&rendered, &values);
        }

        if outcome.code_blocks_found > 0
            && let Some(executor) = self.executor.as_deref_mut()
        {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            executor.set_working_dir(dir);
            let (text, executed) = code::execute_blocks(&rendered, executor);
            rendered = text;
            outcome.code_blocks_executed = executed;
        }

        if outcome.queries_found > 0
            && let Some(queries) = self.queries.as_deref_mut()
        {
            let (text, executed) = query::execute_queries(&rendered, queries);
            rendered = text;
            outcome.queries_executed = executed;
        }

        if !links.is_empty() && !dry_run && !backlinks_disabled {
            outcome.backlinks_updated = backlink::propagate(path, &links);
        }

        outcome.changed = rendered != body;
        if outcome.changed && !dry_run {
            if let Err(e) = fs::write(path, format!("{head}{rendered}")) {
                outcome.error = Some(RenderError::Write(path.to_path_buf(), e));
                return outcome;
            }
            debug!("render"; "{}: {}", path.display(), outcome.summary());
        }
        outcome
    }

    /// Every `.md` file under `dir` in lexicographic path order.
    pub fn collect_files(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, RenderError> {
        collect_markdown(dir, recursive, self.excluded_dir.as_deref())
    }

    /// Render every `.md` file under `dir`, one at a time.
    pub fn render_directory(
        &mut self,
        dir: &Path,
        recursive: bool,
        dry_run: bool,
    ) -> Result<Vec<RenderOutcome>, RenderError> {
        let files = self.collect_files(dir, recursive)?;
        let progress = ProgressBar::new("render", files.len());

        let mut outcomes = Vec::with_capacity(files.len());
        for file in &files {
            outcomes.push(self.render_file(file, dry_run));
            if let Some(bar) = &progress {
                bar.inc();
            }
        }
        if let Some(bar) = &progress {
            bar.finish();
        }
        Ok(outcomes)
    }
}

/// Every `.md` file under `dir` in lexicographic path order, skipping hidden
/// directories and `excluded`.
pub fn collect_markdown(
    dir: &Path,
    recursive: bool,
    excluded: Option<&Path>,
) -> Result<Vec<PathBuf>, RenderError> {
    if !dir.is_dir() {
        return Err(RenderError::NotADirectory(dir.to_path_buf()));
    }

    let walker = WalkDir::new(dir)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let skipped =
                excluded.is_some_and(|ex| entry.path().canonicalize().is_ok_and(|p| p == ex));
            !hidden && !skipped
        });

    let mut files: Vec<PathBuf> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("render"; "walk error: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_markdown(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{
        QueryResponse,
        fakes::{CountingExecutor, StaticQueries, StaticResolver},
    };
    use std::{cell::RefCell, rc::Rc};
    use tempfile::TempDir;

    fn renderer(pairs: &[(&str, &str)]) -> Renderer {
        Renderer::new(Box::new(StaticResolver::new(pairs)))
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    /// Records each batch through a shared handle.
    struct Recording(Rc<RefCell<Vec<Vec<String>>>>);

    impl TemplateResolver for Recording {
        fn resolve_batch(&mut self, keys: &[String]) -> Values {
            self.0.borrow_mut().push(keys.to_vec());
            Values::default()
        }
    }

    #[test]
    fn test_inline_value_replaced() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.md", "Value: [`13`](codebook:a.b)");

        let outcome = renderer(&[("a.b", "42")]).render_file(&path, false);
        assert_eq!(read(&path), "Value: [`42`](codebook:a.b)");
        assert!(outcome.changed);
        assert_eq!((outcome.templates_found, outcome.templates_resolved), (1, 1));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.md", "[`old`](codebook:x) text [`old`](codebook:x)\n");

        renderer(&[("x", "new")]).render_file(&path, false);
        assert_eq!(read(&path), "[`new`](codebook:x) text [`new`](codebook:x)\n");
    }

    #[test]
    fn test_unresolved_keys_untouched() {
        let dir = TempDir::new().unwrap();
        let original = "[`1`](codebook:known) [`?`](codebook:unknown) <span data-codebook=\"gone\">x</span>";
        let path = write(&dir, "a.md", original);

        let outcome = renderer(&[("known", "2")]).render_file(&path, false);
        assert_eq!(
            read(&path),
            "[`2`](codebook:known) [`?`](codebook:unknown) <span data-codebook=\"gone\">x</span>"
        );
        assert_eq!((outcome.templates_found, outcome.templates_resolved), (3, 1));
    }

    #[test]
    fn test_second_render_is_identical() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.md",
            "[`1`](codebook:n) [Docs](http://x \"codebook:docs\")\n<div data-codebook=\"d\">\nold\n</div>\n",
        );
        let pairs = [("n", "7"), ("docs", "http://y"), ("d", "line 1\nline 2")];

        renderer(&pairs).render_file(&path, false);
        let first = read(&path);
        let outcome = renderer(&pairs).render_file(&path, false);
        assert_eq!(read(&path), first);
        assert!(!outcome.changed);
    }

    #[test]
    fn test_backlink_created_once() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.md", "[See B](b.md)");
        let b = write(&dir, "b.md", "# B");

        let outcome = renderer(&[]).render_file(&a, false);
        assert_eq!((outcome.backlinks_found, outcome.backlinks_updated), (1, 1));
        assert!(!outcome.changed);
        let expected = "# B\n\n--- BACKLINKS ---\n[See B](a.md \"codebook:backlink\")\n";
        assert_eq!(read(&b), expected);

        let again = renderer(&[]).render_file(&a, false);
        assert_eq!(again.backlinks_updated, 0);
        assert_eq!(read(&b), expected);
    }

    #[test]
    fn test_incomplete_markup_skips_file() {
        let dir = TempDir::new().unwrap();
        let text = "[`1`](codebook:x)\n<exec lang=\"python\">\nx = 1";
        let path = write(&dir, "a.md", text);

        let outcome = renderer(&[("x", "2")]).render_file(&path, false);
        assert!(matches!(outcome.skipped, Some(Skip::IncompleteMarkup(_))));
        assert_eq!(outcome.templates_found, 0);
        assert_eq!(outcome.code_blocks_found, 0);
        assert!(!outcome.changed);
        assert!(outcome.error.is_none());
        assert_eq!(read(&path), text);
    }

    #[test]
    fn test_truncated_cicada_tag_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let text = "[`1`](codebook:x)\n<cicada endpoint=\"x";
        let path = write(&dir, "a.md", text);

        let outcome = renderer(&[("x", "2")]).render_file(&path, false);
        assert!(outcome.skipped.is_some());
        assert!(!outcome.is_error());
        assert_eq!(read(&path), text);
    }

    #[test]
    fn test_links_disabled() {
        let dir = TempDir::new().unwrap();
        let text = "---\ndisable: links\n---\n[`1`](codebook:x)\n[B](b.md)\n";
        let path = write(&dir, "a.md", text);
        let b = write(&dir, "b.md", "# B");

        let outcome = renderer(&[("x", "2")]).render_file(&path, false);
        assert_eq!(outcome.skipped, Some(Skip::LinksDisabled));
        assert!(outcome.frontmatter.unwrap().links_disabled());
        assert_eq!(read(&path), text);
        assert_eq!(read(&b), "# B");
    }

    #[test]
    fn test_backlinks_disabled_still_renders() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.md",
            "---\ndisable: [backlinks]\n---\n[`1`](codebook:x) [B](b.md)\n",
        );
        let b = write(&dir, "b.md", "# B");

        let outcome = renderer(&[("x", "2")]).render_file(&path, false);
        assert_eq!(
            read(&path),
            "---\ndisable: [backlinks]\n---\n[`2`](codebook:x) [B](b.md)\n"
        );
        assert_eq!(outcome.backlinks_updated, 0);
        assert_eq!(read(&b), "# B");
    }

    #[test]
    fn test_frontmatter_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.md",
            "---\ntitle: \"[`1`](codebook:x)\"\n---\nBody [`1`](codebook:x)\n",
        );

        renderer(&[("x", "2")]).render_file(&path, false);
        assert_eq!(
            read(&path),
            "---\ntitle: \"[`1`](codebook:x)\"\n---\nBody [`2`](codebook:x)\n"
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.md", "[`1`](codebook:x) [B](b.md)");
        let b = write(&dir, "b.md", "# B");

        let outcome = renderer(&[("x", "2")]).render_file(&a, true);
        assert!(outcome.changed);
        assert_eq!(outcome.backlinks_updated, 0);
        assert_eq!(read(&a), "[`1`](codebook:x) [B](b.md)");
        assert_eq!(read(&b), "# B");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let outcome = renderer(&[]).render_file(&dir.path().join("nope.md"), false);
        assert!(matches!(outcome.error, Some(RenderError::Read(..))));
        assert!(!outcome.changed);
    }

    #[test]
    fn test_local_keys_stay_in_process() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.md", "v[`0`](codebook:codebook.version) [`?`](codebook:remote)");
        let calls = Rc::new(RefCell::new(Vec::new()));

        let mut r = Renderer::new(Box::new(Recording(Rc::clone(&calls))));
        let outcome = r.render_file(&path, false);
        assert_eq!(outcome.templates_resolved, 1);
        assert_eq!(*calls.borrow(), vec![vec!["remote".to_string()]]);
        assert!(read(&path).starts_with(&format!(
            "v[`{}`](codebook:codebook.version)",
            env!("CARGO_PKG_VERSION")
        )));
    }

    #[test]
    fn test_backlink_markup_is_not_a_template() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut r = Renderer::new(Box::new(Recording(Rc::clone(&calls))));
        let (text, values) = r.render_content("[A](a.md \"codebook:backlink\")");
        assert_eq!(text, "[A](a.md \"codebook:backlink\")");
        assert!(values.is_empty());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_exec_and_query_blocks() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.md",
            "<exec lang=\"python\">\nx = 1\n</exec>\n<output>\n</output>\n\n<cicada endpoint=\"query\" keywords=\"a\">\n</cicada>\n",
        );
        let mut queries = StaticQueries::default();
        queries.responses.insert(
            "query".into(),
            QueryResponse {
                content: "found".into(),
                data: None,
            },
        );

        let mut r = renderer(&[])
            .with_executor(Box::new(CountingExecutor::default()))
            .with_queries(Box::new(queries));
        let outcome = r.render_file(&path, false);
        assert_eq!((outcome.code_blocks_found, outcome.code_blocks_executed), (1, 1));
        assert_eq!((outcome.queries_found, outcome.queries_executed), (1, 1));
        assert_eq!(
            read(&path),
            "<exec lang=\"python\">\nx = 1\n</exec>\n<output>\nrun 1\n</output>\n\n<cicada endpoint=\"query\" keywords=\"a\">\nfound\n</cicada>\n"
        );
    }

    #[test]
    fn test_blocks_counted_without_collaborators() {
        let dir = TempDir::new().unwrap();
        let text = "<exec lang=\"python\">\nx = 1\n</exec>\n<output>\nold\n</output>\n";
        let path = write(&dir, "a.md", text);

        let outcome = renderer(&[]).render_file(&path, false);
        assert_eq!((outcome.code_blocks_found, outcome.code_blocks_executed), (1, 0));
        assert_eq!(read(&path), text);
    }

    #[test]
    fn test_render_content_pure() {
        let mut r = renderer(&[("k", "v")]);
        let (text, values) = r.render_content("<span data-codebook=\"k\">old</span> [B](b.md)");
        assert_eq!(text, "<span data-codebook=\"k\">v</span> [B](b.md)");
        assert_eq!(values["k"], "v");
    }

    #[test]
    fn test_directory_order_and_filter() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.md", "");
        write(&dir, "a.md", "");
        write(&dir, "notes.txt", "");
        write(&dir, "sub/c.md", "");
        write(&dir, ".hidden/d.md", "");
        write(&dir, "tasks/t.md", "");

        let mut r = renderer(&[]).exclude_dir(&dir.path().join("tasks"));
        let names = |outcomes: Vec<RenderOutcome>| -> Vec<String> {
            outcomes
                .iter()
                .map(|o| {
                    o.path
                        .strip_prefix(dir.path())
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/")
                })
                .collect()
        };

        let all = r.render_directory(dir.path(), true, true).unwrap();
        assert_eq!(names(all), vec!["a.md", "b.md", "sub/c.md"]);

        let flat = r.render_directory(dir.path(), false, true).unwrap();
        assert_eq!(names(flat), vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.md", "");
        assert!(matches!(
            renderer(&[]).render_directory(&file, true, false),
            Err(RenderError::NotADirectory(_))
        ));
    }
}
