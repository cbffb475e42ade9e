//! Project initialization.
//!
//! Writes a `codebook.yml` holding every default so it can be edited in place.

use crate::config::{CONFIG_NAMES, CodebookConfig};
use anyhow::{Context, Result, bail};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Write the default config into `dir`. Refuses to overwrite any existing config.
pub fn write_default_config(dir: &Path) -> Result<PathBuf> {
    if let Some(existing) = CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
    {
        bail!(
            "Config file `{}` already exists. Remove it manually or init in a different path.",
            existing.display()
        );
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let content = serde_yaml::to_string(&CodebookConfig::default())
        .context("Failed to serialize default config")?;
    let path = dir.join(CONFIG_NAMES[0]);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
