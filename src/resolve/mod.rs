//! Collaborators that turn references into values.
//!
//! The renderer only sees these traits; the HTTP clients and the python kernel
//! are the production implementations.

pub mod cicada;
pub mod client;
pub mod extract;
pub mod kernel;

use crate::markup::Values;
use std::path::Path;
use thiserror::Error;

/// Keys in this namespace are answered in-process.
pub const LOCAL_PREFIX: &str = "codebook.";

/// Resolves template keys to display values.
pub trait TemplateResolver {
    /// Resolve as many of `keys` as possible. Missing keys are simply absent.
    fn resolve_batch(&mut self, keys: &[String]) -> Values;
}

/// Result of running one code block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    pub error: Option<String>,
}

impl Execution {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Runs code blocks. State carries over between calls.
pub trait CodeExecutor {
    fn supports(&self, lang: &str) -> bool {
        lang == "python"
    }

    /// Directory the next blocks should run in.
    fn set_working_dir(&mut self, _dir: &Path) {}

    fn execute(&mut self, code: &str) -> Execution;
}

/// Successful query answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub content: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown Cicada endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Backend(String),
}

/// Runs `<cicada>` queries.
pub trait QueryExecutor {
    fn execute_query(
        &mut self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<QueryResponse, QueryError>;
}

/// Resolve keys of the local namespace.
pub fn resolve_local(keys: &[String]) -> Values {
    keys.iter()
        .filter_map(|key| {
            let value = match key.strip_prefix(LOCAL_PREFIX)? {
                "version" => env!("CARGO_PKG_VERSION").to_owned(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

pub fn is_local(key: &str) -> bool {
    key.starts_with(LOCAL_PREFIX)
}
