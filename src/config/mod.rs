//! Configuration management for `codebook.yml`.
//!
//! # Sections
//!
//! | Key / section | Purpose                                        |
//! |---------------|------------------------------------------------|
//! | top level     | Watch directory, exec, timeouts, cache, debounce |
//! | `backend`     | Template backend URL                           |
//! | `cicada`      | Code-intelligence queries                      |
//! | `kernel`      | Python interpreter for `<exec>` blocks         |
//!
//! # Example
//!
//! ```yaml
//! watch_dir: docs
//! exec: true
//! cache_ttl: 30
//! backend:
//!   url: "http://localhost:3000"
//! cicada:
//!   enabled: true
//! ```

pub mod defaults;
mod error;
mod services;

pub use error::ConfigError;
pub use services::{BackendConfig, CicadaConfig, KernelConfig};

use crate::cli::{Cli, Commands};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// File names looked up, in order, in each searched directory.
pub const CONFIG_NAMES: [&str; 2] = ["codebook.yml", "codebook.yaml"];

/// How many parent directories are searched for a config file.
const SEARCH_DEPTH: usize = 10;

/// Root configuration structure representing codebook.yml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CodebookConfig {
    /// Absolute path to the config file, if one was loaded
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Directory rendered and watched by default
    #[serde(default = "defaults::watch_dir", alias = "main_dir")]
    #[educe(Default = defaults::watch_dir())]
    pub watch_dir: PathBuf,

    /// Run `<exec>` blocks
    #[serde(default)]
    pub exec: bool,

    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub recursive: bool,

    /// Excluded from directory renders
    #[serde(default)]
    pub tasks_dir: Option<PathBuf>,

    /// Backend HTTP timeout in seconds
    #[serde(default = "defaults::timeout")]
    #[educe(Default = defaults::timeout())]
    pub timeout: f64,

    /// Template cache TTL in seconds; 0 disables caching
    #[serde(default = "defaults::cache_ttl")]
    #[educe(Default = defaults::cache_ttl())]
    pub cache_ttl: f64,

    /// Watcher debounce in seconds
    #[serde(default = "defaults::debounce")]
    #[educe(Default = defaults::debounce())]
    pub debounce: f64,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub cicada: CicadaConfig,

    #[serde(default)]
    pub kernel: KernelConfig,
}

/// Nearest config file at or above `start`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let start = CodebookConfig::normalize_path(start);
    start.ancestors().take(SEARCH_DEPTH + 1).find_map(|dir| {
        CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    })
}

impl CodebookConfig {
    /// Parse configuration from a YAML string. An empty document is all defaults.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;
        config.config_path = Some(Self::normalize_path(path));
        Ok(config)
    }

    /// `explicit` if given, otherwise the nearest config file above the
    /// current directory, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_path(path)?,
            None => match find_config_file(Path::new(".")) {
                Some(path) => Self::from_path(&path)?,
                None => Self::default(),
            },
        };
        config.resolve_paths();
        Ok(config)
    }

    /// Directory relative paths in the config are resolved against.
    fn base_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| Self::normalize_path(Path::new(".")), Path::to_path_buf)
    }

    /// Expand `~` and anchor relative paths at the config file's directory.
    fn resolve_paths(&mut self) {
        let base = self.base_dir();
        let resolve = |path: &Path| {
            let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
            if expanded.is_relative() {
                Self::normalize_path(&base.join(expanded))
            } else {
                Self::normalize_path(&expanded)
            }
        };

        self.watch_dir = resolve(&self.watch_dir);
        self.tasks_dir = self.tasks_dir.as_deref().map(resolve);
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.backend.url, cli.base_url.as_ref());
        Self::update_option(&mut self.cicada.url, cli.cicada_url.as_ref());
        Self::update_option(&mut self.timeout, cli.timeout.as_ref());
        Self::update_option(&mut self.cache_ttl, cli.cache_ttl.as_ref());

        match &cli.command {
            Commands::Render {
                recursive,
                exec,
                cicada,
                ..
            }
            | Commands::Watch {
                recursive,
                exec,
                cicada,
                ..
            } => {
                Self::update_option(&mut self.recursive, recursive.as_ref());
                Self::update_option(&mut self.exec, exec.as_ref());
                Self::update_option(&mut self.cicada.enabled, cicada.as_ref());
            }
            Commands::Diff { recursive, .. } => {
                Self::update_option(&mut self.recursive, recursive.as_ref());
            }
            _ => {}
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    pub fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs_f64(self.cache_ttl)
    }

    pub fn debounce_duration(&self) -> Duration {
        Duration::from_secs_f64(self.debounce)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [("backend.url", &self.backend.url), ("cicada.url", &self.cicada.url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "[{field}] must start with http:// or https://"
                )));
            }
        }

        let positive = [
            ("timeout", self.timeout),
            ("debounce", self.debounce),
            ("cicada.timeout", self.cicada.timeout),
            ("kernel.timeout", self.kernel.timeout),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "[{field}] must be a positive number of seconds"
                )));
            }
        }
        if !(self.cache_ttl.is_finite() && self.cache_ttl >= 0.0) {
            return Err(ConfigError::Validation(
                "[cache_ttl] must not be negative".into(),
            ));
        }

        if self.exec {
            Self::check_command_installed("[kernel.command]", &self.kernel.command)?;
        }
        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<(), ConfigError> {
        let Some(cmd) = command.first() else {
            return Err(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };
        which::which(cmd).map_err(|_| {
            ConfigError::Validation(format!("`{cmd}` not found. Please install it first."))
        })?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
