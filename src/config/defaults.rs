//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

use std::path::PathBuf;

pub fn r#true() -> bool {
    true
}

pub fn watch_dir() -> PathBuf {
    ".".into()
}

/// Backend HTTP timeout in seconds.
pub fn timeout() -> f64 {
    10.0
}

pub fn cache_ttl() -> f64 {
    60.0
}

pub fn debounce() -> f64 {
    0.5
}

pub mod backend {
    pub fn url() -> String {
        "http://localhost:3000".into()
    }
}

pub mod cicada {
    pub fn url() -> String {
        "http://localhost:9999".into()
    }

    pub fn timeout() -> f64 {
        30.0
    }
}

pub mod kernel {
    pub fn command() -> Vec<String> {
        vec!["python3".into()]
    }

    pub fn timeout() -> f64 {
        30.0
    }
}
