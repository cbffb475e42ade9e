//! `backend`, `cicada` and `kernel` sections: the collaborators a render
//! talks to.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// Template backend.
///
/// # Example
/// ```yaml
/// backend:
///   url: "http://localhost:3000"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default = "defaults::backend::url")]
    #[educe(Default = defaults::backend::url())]
    pub url: String,
}

/// Cicada code-intelligence server used by `<cicada>` blocks.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CicadaConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "defaults::cicada::url")]
    #[educe(Default = defaults::cicada::url())]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::cicada::timeout")]
    #[educe(Default = defaults::cicada::timeout())]
    pub timeout: f64,
}

/// Interpreter for `<exec lang="python">` blocks.
///
/// # Example
/// ```yaml
/// kernel:
///   command: ["uv", "run", "python"]
///   timeout: 60
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    #[serde(default = "defaults::kernel::command")]
    #[educe(Default = defaults::kernel::command())]
    pub command: Vec<String>,

    /// Per-block timeout in seconds.
    #[serde(default = "defaults::kernel::timeout")]
    #[educe(Default = defaults::kernel::timeout())]
    pub timeout: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cicada_defaults() {
        let config: CicadaConfig = serde_yaml::from_str("enabled: true").unwrap();
        assert!(config.enabled);
        assert_eq!(config.url, "http://localhost:9999");
        assert_eq!(config.timeout, 30.0);
    }

    #[test]
    fn test_kernel_command() {
        let config: KernelConfig =
            serde_yaml::from_str("command: [uv, run, python]\ntimeout: 5").unwrap();
        assert_eq!(config.command, vec!["uv", "run", "python"]);
        assert_eq!(config.timeout, 5.0);
    }

    #[test]
    fn test_unknown_field_rejection() {
        assert!(serde_yaml::from_str::<BackendConfig>("url: x\nport: 1").is_err());
    }
}
