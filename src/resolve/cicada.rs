//! Cicada code-intelligence client.
//!
//! Every endpoint is `POST /api/{endpoint}` with a JSON body and answers
//! `{"success": bool, "data": string | {"content": string}, "error": string}`.

use super::{QueryError, QueryExecutor, QueryResponse};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Endpoints the client knows how to call.
pub const ENDPOINTS: &[&str] = &["query", "search-function", "search-module", "git-history"];

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct CicadaClient {
    base_url: String,
    http: Client,
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

fn insert_opt(body: &mut Map<String, Value>, params: &[(String, String)], name: &str) {
    if let Some(value) = param(params, name) {
        body.insert(name.to_owned(), json!(value));
    }
}

fn flag(params: &[(String, String)], name: &str) -> bool {
    param(params, name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Build the request body for `endpoint` from block attributes.
pub fn request_body(endpoint: &str, params: &[(String, String)]) -> Result<Value, QueryError> {
    let mut body = Map::new();
    match endpoint {
        "query" => {
            if let Some(keywords) = param(params, "keywords") {
                let list: Vec<&str> = keywords
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .collect();
                body.insert("keywords".into(), json!(list));
            }
            insert_opt(&mut body, params, "pattern");
            insert_opt(&mut body, params, "path_pattern");
            body.insert("scope".into(), json!(param(params, "scope").unwrap_or("all")));
            body.insert(
                "filter_type".into(),
                json!(param(params, "filter_type").unwrap_or("all")),
            );
            body.insert(
                "match_source".into(),
                json!(param(params, "match_source").unwrap_or("all")),
            );
            body.insert("recent".into(), json!(flag(params, "recent")));
            body.insert("show_snippets".into(), json!(flag(params, "show_snippets")));
        }
        "search-function" => {
            body.insert(
                "function_name".into(),
                json!(param(params, "function_name").unwrap_or_default()),
            );
            insert_opt(&mut body, params, "module_name");
            if let Some(arity) = param(params, "arity").and_then(|a| a.parse::<u32>().ok()) {
                body.insert("arity".into(), json!(arity));
            }
        }
        "search-module" => {
            insert_opt(&mut body, params, "module_name");
            insert_opt(&mut body, params, "file_path");
        }
        "git-history" => {
            insert_opt(&mut body, params, "file_path");
            insert_opt(&mut body, params, "module_name");
            let limit = param(params, "limit")
                .and_then(|l| l.parse::<u32>().ok())
                .unwrap_or(10);
            body.insert("limit".into(), json!(limit));
        }
        other => return Err(QueryError::UnknownEndpoint(other.to_owned())),
    }
    body.insert(
        "format".into(),
        json!(param(params, "format").unwrap_or("json")),
    );
    Ok(Value::Object(body))
}

/// Turn a decoded API response into content plus structured data.
fn interpret(response: ApiResponse) -> Result<QueryResponse, QueryError> {
    if !response.success {
        return Err(QueryError::Backend(
            response.error.unwrap_or_else(|| "Unknown error".into()),
        ));
    }

    let content = match response.data {
        Some(Value::String(s)) => s,
        Some(Value::Object(map)) => map
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        _ => String::new(),
    };

    let data = if content.starts_with('{') || content.starts_with('[') {
        serde_json::from_str(&content).ok()
    } else {
        None
    };

    Ok(QueryResponse { content, data })
}

impl CicadaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .is_ok_and(|r| r.status().is_success())
    }

    fn post(&self, endpoint: &str, body: &Value) -> Result<QueryResponse, QueryError> {
        let response = self
            .http
            .post(format!("{}/api/{endpoint}", self.base_url))
            .json(body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|r| r.json::<ApiResponse>())
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        interpret(response)
    }
}

impl QueryExecutor for CicadaClient {
    fn execute_query(
        &mut self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<QueryResponse, QueryError> {
        let body = request_body(endpoint, params)?;
        self.post(endpoint, &body)
    }
}
