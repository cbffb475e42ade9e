//! HTTP template resolver with a TTL cache.
//!
//! # Backend API
//!
//! | Request                              | Response                       |
//! |--------------------------------------|--------------------------------|
//! | `GET  /resolve/{key}`                | `{"value": V}`                 |
//! | `POST /resolve/batch` `{"templates"}`| `{"values": {key: V}}`         |
//! | `GET  /health`                       | `200`                          |

use super::TemplateResolver;
use crate::{debug, log, markup::Values};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct SingleResponse {
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    values: FxHashMap<String, Value>,
}

struct CacheEntry {
    value: String,
    stored: Instant,
}

/// Client for the template backend.
pub struct BackendClient {
    base_url: String,
    http: Client,
    cache_ttl: Duration,
    cache: FxHashMap<String, CacheEntry>,
    warned_unreachable: bool,
}

/// Stringify a JSON value the way documents display it. `null` is unresolved.
fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration, cache_ttl: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
            cache_ttl,
            cache: FxHashMap::default(),
            warned_unreachable: false,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn cached(&self, key: &str) -> Option<&str> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        self.cache
            .get(key)
            .filter(|entry| entry.stored.elapsed() < self.cache_ttl)
            .map(|entry| entry.value.as_str())
    }

    fn store(&mut self, key: &str, value: &str) {
        if self.cache_ttl.is_zero() {
            return;
        }
        self.cache.insert(
            key.to_owned(),
            CacheEntry {
                value: value.to_owned(),
                stored: Instant::now(),
            },
        );
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn warn_unreachable(&mut self, err: &reqwest::Error) {
        if err.is_connect() || err.is_timeout() {
            if !self.warned_unreachable {
                log!("resolve"; "backend unreachable at {}: {err}", self.base_url);
                self.warned_unreachable = true;
            }
        } else {
            debug!("resolve"; "request failed: {err}");
        }
    }

    /// Resolve a single key.
    pub fn resolve(&mut self, key: &str) -> Option<String> {
        if let Some(value) = self.cached(key) {
            return Some(value.to_owned());
        }

        // Keys go into the path unencoded
        let url = format!("{}/resolve/{key}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|r| r.json::<SingleResponse>());

        match response {
            Ok(body) => {
                let value = body.value.as_ref().and_then(display_value)?;
                self.store(key, &value);
                Some(value)
            }
            Err(err) => {
                self.warn_unreachable(&err);
                None
            }
        }
    }

    fn request_batch(&self, keys: &[String]) -> reqwest::Result<BatchResponse> {
        self.http
            .post(format!("{}/resolve/batch", self.base_url))
            .json(&json!({ "templates": keys }))
            .send()?
            .error_for_status()?
            .json()
    }

    /// `GET /health` answers 200.
    pub fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .send()
            .is_ok_and(|r| r.status().is_success())
    }
}

impl TemplateResolver for BackendClient {
    fn resolve_batch(&mut self, keys: &[String]) -> Values {
        let mut values = Values::default();
        let mut missing = Vec::new();
        for key in keys {
            match self.cached(key) {
                Some(value) => {
                    values.insert(key.clone(), value.to_owned());
                }
                None => missing.push(key.clone()),
            }
        }
        if missing.is_empty() {
            return values;
        }

        match self.request_batch(&missing) {
            Ok(batch) => {
                for (key, value) in batch.values {
                    if let Some(value) = display_value(&value) {
                        self.store(&key, &value);
                        values.insert(key, value);
                    }
                }
            }
            Err(err) => {
                debug!(
                    "resolve"; "batch failed ({err}), resolving {} keys one by one", missing.len()
                );
                if err.is_connect() {
                    self.warn_unreachable(&err);
                    return values;
                }
                for key in &missing {
                    if let Some(value) = self.resolve(key) {
                        values.insert(key.clone(), value);
                    }
                }
            }
        }
        values
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::TestServer;
    use super::*;

    fn client(url: &str, ttl: u64) -> BackendClient {
        BackendClient::new(url, Duration::from_secs(5), Duration::from_secs(ttl)).unwrap()
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_batch_resolution() {
        let server = TestServer::start(|_, path, body| {
            assert_eq!(path, "/resolve/batch");
            assert!(body.contains("\"templates\""));
            (200, r#"{"values": {"a.b": "42", "n": 7, "gone": null}}"#.into())
        });
        let mut c = client(&server.url, 60);

        let values = c.resolve_batch(&keys(&["a.b", "n", "gone", "unknown"]));
        assert_eq!(values.len(), 2);
        assert_eq!(values["a.b"], "42");
        assert_eq!(values["n"], "7");
    }

    #[test]
    fn test_cache_avoids_second_request() {
        let server = TestServer::start(|_, _, _| {
            (200, r#"{"values": {"a": "1"}}"#.into())
        });
        let mut c = client(&server.url, 60);

        c.resolve_batch(&keys(&["a"]));
        let values = c.resolve_batch(&keys(&["a"]));
        assert_eq!(values["a"], "1");
        assert_eq!(server.paths().len(), 1);

        c.clear_cache();
        c.resolve_batch(&keys(&["a"]));
        assert_eq!(server.paths().len(), 2);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let server = TestServer::start(|_, _, _| {
            (200, r#"{"values": {"a": "1"}}"#.into())
        });
        let mut c = client(&server.url, 0);
        c.resolve_batch(&keys(&["a"]));
        c.resolve_batch(&keys(&["a"]));
        assert_eq!(server.paths().len(), 2);
    }

    #[test]
    fn test_batch_failure_falls_back_to_single() {
        let server = TestServer::start(|method, path, _| match (method, path) {
            ("POST", _) => (500, "{}".into()),
            ("GET", "/resolve/a") => (200, r#"{"value": "one"}"#.into()),
            _ => (404, "{}".into()),
        });
        let mut c = client(&server.url, 60);

        let values = c.resolve_batch(&keys(&["a", "b"]));
        assert_eq!(values.len(), 1);
        assert_eq!(values["a"], "one");
        assert_eq!(
            server.paths(),
            vec!["POST /resolve/batch", "GET /resolve/a", "GET /resolve/b"]
        );
    }

    #[test]
    fn test_single_key_sent_unencoded() {
        let server = TestServer::start(|_, path, _| match path {
            "/resolve/docs/v1.url" => (200, r#"{"value": "https://x.io"}"#.into()),
            _ => (404, "{}".into()),
        });
        let mut c = client(&server.url, 60);

        assert_eq!(c.resolve("docs/v1.url").as_deref(), Some("https://x.io"));
        assert_eq!(server.paths(), vec!["GET /resolve/docs/v1.url"]);
    }

    #[test]
    fn test_unreachable_backend_yields_nothing() {
        // Nothing listens on port 9 (discard) on test machines
        let mut c = BackendClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            Duration::from_secs(60),
        )
        .unwrap();
        assert!(c.resolve_batch(&keys(&["a"])).is_empty());
        assert!(!c.health_check());
    }

    #[test]
    fn test_health_check() {
        let server = TestServer::start(|_, path, _| match path {
            "/health" => (200, r#"{"status": "ok"}"#.into()),
            _ => (404, "{}".into()),
        });
        assert!(client(&server.url, 60).health_check());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let c = client("http://localhost:3000/", 60);
        assert_eq!(c.base_url(), "http://localhost:3000");
    }
}
