//! Subcommand implementations on top of a loaded config.

use crate::{
    config::CodebookConfig,
    diff::{diff_directory, diff_file, show_rendered},
    init::write_default_config,
    log,
    render::{RenderOutcome, Renderer},
    resolve::{cicada::CicadaClient, client::BackendClient, kernel::PythonKernel},
    status::check_path,
    utils::path::display_relative,
    watch::{WatchOptions, watch_blocking},
};
use anyhow::{Context, Result, bail};
use std::{fs, path::Path, time::Duration};

fn backend(config: &CodebookConfig) -> Result<BackendClient> {
    BackendClient::new(
        &config.backend.url,
        config.http_timeout(),
        config.cache_duration(),
    )
}

fn cicada(config: &CodebookConfig) -> Result<CicadaClient> {
    CicadaClient::new(
        &config.cicada.url,
        Duration::from_secs_f64(config.cicada.timeout),
    )
}

/// Renderer wired to the services enabled in `config`.
pub fn build_renderer(config: &CodebookConfig) -> Result<Renderer> {
    let mut renderer = Renderer::new(Box::new(backend(config)?));

    if config.exec {
        let kernel = PythonKernel::new(
            config.kernel.command.clone(),
            Duration::from_secs_f64(config.kernel.timeout),
        );
        renderer = renderer.with_executor(Box::new(kernel));
    }
    if config.cicada.enabled {
        renderer = renderer.with_queries(Box::new(cicada(config)?));
    }
    if let Some(tasks_dir) = &config.tasks_dir {
        renderer = renderer.exclude_dir(tasks_dir);
    }
    Ok(renderer)
}

/// Templates only; exec and query blocks are left alone.
fn template_renderer(config: &CodebookConfig) -> Result<Renderer> {
    Ok(Renderer::new(Box::new(backend(config)?)))
}

fn report_outcome(outcome: RenderOutcome, root: &Path, dry_run: bool) {
    let rel = display_relative(&outcome.path, root);
    if let Some(err) = outcome.error {
        log!("error"; "{:#}", anyhow::Error::new(err));
    } else if let Some(skip) = &outcome.skipped {
        log!("render"; "skipped {} ({skip})", rel.display());
    } else if outcome.changed {
        let verb = if dry_run { "would update" } else { "updated" };
        log!("render"; "{verb} {} ({})", rel.display(), outcome.summary());
    }
}

/// `render`: one file or a whole directory.
pub fn render(config: &CodebookConfig, path: Option<&Path>, dry_run: bool) -> Result<()> {
    let target = path.unwrap_or(&config.watch_dir);
    let mut renderer = build_renderer(config)?;

    let (outcomes, root) = if target.is_file() {
        let root = target.parent().unwrap_or(Path::new(".")).to_path_buf();
        (vec![renderer.render_file(target, dry_run)], root)
    } else {
        let outcomes = renderer.render_directory(target, config.recursive, dry_run)?;
        (outcomes, target.to_path_buf())
    };

    let total = outcomes.len();
    let changed = outcomes.iter().filter(|o| o.changed).count();
    let failed = outcomes.iter().filter(|o| o.is_error()).count();
    for outcome in outcomes {
        report_outcome(outcome, &root, dry_run);
    }

    let verb = if dry_run { "would change" } else { "changed" };
    log!("render"; "{changed}/{total} files {verb}");

    if failed > 0 {
        bail!("{failed} file(s) failed to render");
    }
    Ok(())
}

/// `watch` and `run`.
pub fn watch(config: &CodebookConfig, path: Option<&Path>, initial: bool) -> Result<()> {
    let backend = backend(config)?;
    if !backend.health_check() {
        bail!("Backend is not responding at {}", backend.base_url());
    }
    log!("watch"; "backend healthy at {}", backend.base_url());

    let mut renderer = build_renderer(config)?;
    let options = WatchOptions {
        dir: path.unwrap_or(&config.watch_dir).to_path_buf(),
        recursive: config.recursive,
        debounce: config.debounce_duration(),
        initial,
    };
    watch_blocking(&mut renderer, &options)
}

/// `diff`: print or save what rendering changed against `rev`.
pub fn diff(config: &CodebookConfig, path: &Path, rev: &str, output: Option<&Path>) -> Result<()> {
    let mut renderer = template_renderer(config)?;

    let text = if path.is_dir() {
        let report = diff_directory(&mut renderer, path, config.recursive, rev)?;
        for (file, err) in &report.failed {
            log!("error"; "{}: {err}", file.display());
        }
        report.diff
    } else {
        diff_file(&mut renderer, path, rev)?
    };

    match output {
        Some(out) => {
            fs::write(out, &text).with_context(|| format!("Failed to write {}", out.display()))?;
            log!("diff"; "written to {}", out.display());
        }
        None if text.is_empty() => log!("diff"; "no changes"),
        None => print!("{text}"),
    }
    Ok(())
}

/// `show`: rendered content on stdout.
pub fn show(config: &CodebookConfig, file: &Path) -> Result<()> {
    let mut renderer = template_renderer(config)?;
    print!("{}", show_rendered(&mut renderer, file)?);
    Ok(())
}

/// `health`: probe the backend, and Cicada when enabled.
pub fn health(config: &CodebookConfig) -> Result<()> {
    let backend = backend(config)?;
    let mut unhealthy = Vec::new();

    if backend.health_check() {
        log!("health"; "backend healthy at {}", backend.base_url());
    } else {
        log!("error"; "backend not responding at {}", backend.base_url());
        unhealthy.push("backend");
    }

    if config.cicada.enabled {
        let cicada = cicada(config)?;
        if cicada.health_check() {
            log!("health"; "cicada healthy at {}", cicada.base_url());
        } else {
            log!("error"; "cicada not responding at {}", cicada.base_url());
            unhealthy.push("cicada");
        }
    }

    if !unhealthy.is_empty() {
        bail!("unhealthy: {}", unhealthy.join(", "));
    }
    Ok(())
}

/// `status`: returns the process exit code.
pub fn status(
    config: &CodebookConfig,
    path: Option<&Path>,
    check_backend: bool,
    check_cicada: bool,
) -> Result<i32> {
    let target = path.unwrap_or(&config.watch_dir);
    let mut report = check_path(target, config.recursive, config.tasks_dir.as_deref())?;

    if check_backend {
        report.probes.push(("backend", backend(config)?.health_check()));
    }
    if check_cicada {
        report.probes.push(("cicada", cicada(config)?.health_check()));
    }

    let root = if target.is_file() {
        target.parent().unwrap_or(Path::new("."))
    } else {
        target
    };
    report.print(root);
    Ok(report.exit_code())
}

/// `init`: write a default `codebook.yml`.
pub fn init(path: Option<&Path>) -> Result<()> {
    let written = write_default_config(path.unwrap_or(Path::new(".")))?;
    log!("config"; "wrote {}", written.display());
    Ok(())
}
