//! File system watcher for live rendering.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Event Loop                          │
//! │                                                            │
//! │  ┌──────────┐    ┌───────────┐    ┌─────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer │───▶│  handle_changes()   │  │
//! │  │ events   │    │ (.md only)│    │  render_file() each │  │
//! │  └──────────┘    └───────────┘    └─────────────────────┘  │
//! │  ┌──────────┐          ▲                     │             │
//! │  │ Ctrl-C   │─ stop    └──── cooldown ◀──────┘             │
//! │  └──────────┘                                              │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering writes the file it just read, which fires another event. Paths
//! rendered within the last [`SELF_WRITE_COOLDOWN`] are ignored so a render
//! does not trigger itself.

use crate::{
    log,
    logger::WatchStatus,
    render::{RenderOutcome, Renderer},
    utils::path::{display_relative, is_markdown, is_temp_file},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

const SELF_WRITE_COOLDOWN: Duration = Duration::from_secs(2);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct WatchOptions {
    pub dir: PathBuf,
    pub recursive: bool,
    pub debounce: Duration,
    /// Render the whole directory once before waiting for changes
    pub initial: bool,
}

enum WatchMsg {
    Fs(notify::Result<Event>),
    Shutdown,
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events and remembers what was just rendered.
struct Debouncer {
    debounce: Duration,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    rendered: FxHashMap<PathBuf, Instant>,
}

fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl Debouncer {
    fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: FxHashSet::default(),
            last_event: None,
            rendered: FxHashMap::default(),
        }
    }

    fn in_cooldown(&self, path: &Path) -> bool {
        self.rendered
            .get(path)
            .is_some_and(|t| t.elapsed() < SELF_WRITE_COOLDOWN)
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_markdown(&path) || is_temp_file(&path) {
                continue;
            }
            let path = resolve(&path);
            if !self.in_cooldown(&path) {
                // Same path again only pushes the deadline back
                self.pending.insert(path);
                self.last_event = Some(Instant::now());
            }
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty() && self.last_event.is_some_and(|t| t.elapsed() >= self.debounce)
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn mark_rendered(&mut self, path: &Path) {
        self.rendered.insert(resolve(path), Instant::now());
        self.rendered
            .retain(|_, t| t.elapsed() < SELF_WRITE_COOLDOWN);
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            IDLE_TIMEOUT
        } else {
            self.debounce
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

fn report(outcome: RenderOutcome, root: &Path, status: &mut WatchStatus) {
    let rel = display_relative(&outcome.path, root).display().to_string();
    if let Some(err) = outcome.error {
        status.error(&format!("failed: {rel}"), &format!("{:#}", anyhow::Error::new(err)));
    } else if let Some(skip) = outcome.skipped {
        status.skipped(&rel, &skip.to_string());
    } else if outcome.changed || outcome.backlinks_updated > 0 {
        status.success(&format!("rendered: {rel} ({})", outcome.summary()));
    } else {
        status.unchanged(&rel);
    }
}

/// Render each changed file that still exists.
fn handle_changes(
    paths: &[PathBuf],
    renderer: &mut Renderer,
    debouncer: &mut Debouncer,
    root: &Path,
    status: &mut WatchStatus,
) {
    for path in paths.iter().filter(|p| p.is_file()) {
        let outcome = renderer.render_file(path, false);
        debouncer.mark_rendered(path);
        report(outcome, root, status);
    }
}

fn event_loop(
    rx: &Receiver<WatchMsg>,
    renderer: &mut Renderer,
    debouncer: &mut Debouncer,
    root: &Path,
) {
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(WatchMsg::Fs(Ok(event))) if is_relevant(&event) => debouncer.add(event),
            Ok(WatchMsg::Fs(Err(e))) => log!("watch"; "error: {e}"),
            Ok(WatchMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                handle_changes(&debouncer.take(), renderer, debouncer, root, &mut status);
            }
            // Irrelevant events, timeout without ready
            _ => {}
        }
    }
}

const fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

// =============================================================================
// Public API
// =============================================================================

/// Watch `options.dir` and render changed markdown files until Ctrl-C.
pub fn watch_blocking(renderer: &mut Renderer, options: &WatchOptions) -> Result<()> {
    let dir = resolve(&options.dir);
    let mut debouncer = Debouncer::new(options.debounce);

    if options.initial {
        let outcomes = renderer.render_directory(&dir, options.recursive, false)?;
        let changed = outcomes.iter().filter(|o| o.changed).count();
        log!("watch"; "initial render: {changed}/{} files changed", outcomes.len());
        for outcome in &outcomes {
            debouncer.mark_rendered(&outcome.path);
        }
    }

    let (tx, rx) = mpsc::channel();
    let fs_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res| {
        fs_tx.send(WatchMsg::Fs(res)).ok();
    })
    .context("Failed to create file watcher")?;

    let mode = if options.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(&dir, mode)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    ctrlc::set_handler(move || {
        tx.send(WatchMsg::Shutdown).ok();
    })
    .context("Failed to install Ctrl-C handler")?;

    log!("watch"; "watching {} (Ctrl-C to stop)", dir.display());
    event_loop(&rx, renderer, &mut debouncer, &dir);
    log!("watch"; "stopped");
    Ok(())
}
