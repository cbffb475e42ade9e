//! Codebook - keeps markdown documentation in sync with live values.

mod cli;
mod commands;
mod config;
mod diff;
mod init;
mod logger;
mod markup;
mod render;
mod resolve;
mod status;
mod utils;
mod watch;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::CodebookConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    if let Commands::Init { path } = &cli.command {
        return commands::init(path.as_deref());
    }
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Render { path, dry_run, .. } => {
            commands::render(&config, path.as_deref(), *dry_run)
        }
        Commands::Watch { path, initial, .. } => {
            commands::watch(&config, path.as_deref(), initial.unwrap_or(true))
        }
        Commands::Run => commands::watch(&config, None, true),
        Commands::Diff {
            path, rev, output, ..
        } => commands::diff(&config, path, rev, output.as_deref()),
        Commands::Show { file } => commands::show(&config, file),
        Commands::Health => commands::health(&config),
        Commands::Status {
            path,
            check_backend,
            check_cicada,
        } => {
            let code =
                commands::status(&config, path.as_deref(), *check_backend, *check_cicada)?;
            std::process::exit(code)
        }
        Commands::Init { .. } => Ok(()),
    }
}

/// Load, override and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<CodebookConfig> {
    let mut config = CodebookConfig::load(cli.config.as_deref())?;
    config.update_with_cli(cli);
    config.validate()?;

    match &config.config_path {
        Some(path) => crate::debug!("config"; "loaded {}", path.display()),
        None => crate::debug!("config"; "no codebook.yml found, using defaults"),
    }
    Ok(config)
}
