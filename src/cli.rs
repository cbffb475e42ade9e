//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keep markdown docs alive: resolve live references, run code blocks and
/// maintain backlinks in place
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Template backend URL
    #[arg(short, long = "base-url", env = "CODEBOOK_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Cicada server URL
    #[arg(long, env = "CICADA_URL", global = true)]
    pub cicada_url: Option<String>,

    /// Backend request timeout in seconds
    #[arg(short, long, global = true)]
    pub timeout: Option<f64>,

    /// Template cache TTL in seconds (0 disables the cache)
    #[arg(short, long, global = true)]
    pub cache_ttl: Option<f64>,

    /// Config file (default: nearest codebook.yml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Print debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Render a directory (or a single file) once
    Render {
        /// File or directory (default: watch_dir from config)
        path: Option<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        recursive: Option<bool>,

        /// Compute changes without writing any file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Execute <exec> code blocks
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        exec: Option<bool>,

        /// Run <cicada> queries
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        cicada: Option<bool>,
    },

    /// Watch a directory and re-render files on change
    Watch {
        /// Directory (default: watch_dir from config)
        path: Option<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        recursive: Option<bool>,

        /// Execute <exec> code blocks
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        exec: Option<bool>,

        /// Run <cicada> queries
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        cicada: Option<bool>,

        /// Render everything once before watching (default: true)
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        initial: Option<bool>,
    },

    /// Watch using configuration values only
    Run,

    /// Show what rendering would change against a git revision
    Diff {
        /// File or directory
        path: PathBuf,

        /// Revision to compare against
        #[arg(long = "ref", default_value = "HEAD")]
        rev: String,

        /// Descend into subdirectories
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        recursive: Option<bool>,

        /// Write the diff to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the rendered content of a file without writing it
    Show {
        file: PathBuf,
    },

    /// Check backend (and Cicada) health
    Health,

    /// Report broken links and malformed markup
    Status {
        /// File or directory (default: watch_dir from config)
        path: Option<PathBuf>,

        /// Also probe the template backend
        #[arg(long)]
        check_backend: bool,

        /// Also probe the Cicada server
        #[arg(long)]
        check_cicada: bool,
    },

    /// Write a default codebook.yml
    Init {
        /// Directory to write into (default: current directory)
        path: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_bool_flags() {
        let cli = Cli::parse_from(["codebook", "watch", "docs", "--exec", "--initial=false"]);
        match cli.command {
            Commands::Watch {
                path,
                exec,
                initial,
                recursive,
                ..
            } => {
                assert_eq!(path, Some(PathBuf::from("docs")));
                assert_eq!(exec, Some(true));
                assert_eq!(initial, Some(false));
                assert_eq!(recursive, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["codebook", "render", "-n", "-v", "--timeout", "2.5"]);
        assert!(cli.verbose);
        assert_eq!(cli.timeout, Some(2.5));
        assert!(matches!(cli.command, Commands::Render { dry_run: true, .. }));
    }

    #[test]
    fn test_diff_defaults() {
        let cli = Cli::parse_from(["codebook", "diff", "a.md"]);
        match cli.command {
            Commands::Diff { rev, output, .. } => {
                assert_eq!(rev, "HEAD");
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
