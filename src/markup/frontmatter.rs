//! YAML frontmatter reader.
//!
//! A document may start with a `---\n...\n---\n` block. Recognized keys are
//! `title`, `tags` and `disable`; every key is also kept in `raw`.

use regex::Regex;
use serde_json::Value;
use std::{collections::BTreeMap, sync::LazyLock};

static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\n(.*?)\n---\n?").unwrap());

/// Features a document can switch off via `disable:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Links,
    Backlinks,
}

impl Feature {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "links" => Some(Self::Links),
            "backlinks" => Some(Self::Backlinks),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub disabled: Vec<Feature>,
    pub raw: BTreeMap<String, Value>,
}

impl Frontmatter {
    pub fn links_disabled(&self) -> bool {
        self.disabled.contains(&Feature::Links)
    }

    pub fn backlinks_disabled(&self) -> bool {
        self.disabled.contains(&Feature::Backlinks)
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn from_map(raw: BTreeMap<String, Value>) -> Self {
        let title = raw.get("title").and_then(scalar_to_string);
        let tags = raw.get("tags").map(string_list).unwrap_or_default();
        let mut disabled = Vec::new();
        for feature in raw
            .get("disable")
            .map(string_list)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| Feature::parse(s))
        {
            if !disabled.contains(&feature) {
                disabled.push(feature);
            }
        }

        Self {
            title,
            tags,
            disabled,
            raw,
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A string or a list of strings; anything else is empty.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

/// Parse a YAML mapping into JSON-compatible values.
fn parse_mapping(yaml: &str) -> Option<BTreeMap<String, Value>> {
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
    match serde_json::to_value(yaml_value).ok()? {
        Value::Object(map) => Some(map.into_iter().collect()),
        Value::Null => Some(BTreeMap::new()),
        _ => None,
    }
}

/// Split `content` into frontmatter and the byte offset where the body starts.
///
/// Invalid YAML, a non-mapping block, or a block not at the very start of the
/// document yields an empty frontmatter and offset 0 (the whole text is body).
pub fn parse(content: &str) -> (Frontmatter, usize) {
    let Some(caps) = FRONTMATTER.captures(content) else {
        return (Frontmatter::default(), 0);
    };
    let (Some(whole), Some(yaml)) = (caps.get(0), caps.get(1)) else {
        return (Frontmatter::default(), 0);
    };

    match parse_mapping(yaml.as_str()) {
        Some(raw) => (Frontmatter::from_map(raw), whole.end()),
        None => (Frontmatter::default(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(content: &str) -> (Frontmatter, &str) {
        let (frontmatter, body_start) = parse(content);
        (frontmatter, &content[body_start..])
    }

    #[test]
    fn test_basic_frontmatter() {
        let content = "---\ntitle: Guide\ntags: [a, b]\n---\n# Body\n";
        let (fm, body) = split(content);
        assert_eq!(fm.title.as_deref(), Some("Guide"));
        assert_eq!(fm.tags, vec!["a", "b"]);
        assert_eq!(body, "# Body\n");
        assert!(!fm.links_disabled());
    }

    #[test]
    fn test_no_frontmatter() {
        let content = "# Just a doc\n";
        let (fm, body) = split(content);
        assert!(fm.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn test_tags_as_string() {
        let (fm, _) = split("---\ntags: solo\n---\n");
        assert_eq!(fm.tags, vec!["solo"]);
    }

    #[test]
    fn test_disable_string_and_list() {
        let (fm, _) = split("---\ndisable: links\n---\nbody");
        assert!(fm.links_disabled());
        assert!(!fm.backlinks_disabled());

        let (fm, _) = split("---\ndisable:\n  - backlinks\n  - links\n  - other\n---\n");
        assert!(fm.links_disabled());
        assert!(fm.backlinks_disabled());
        assert_eq!(fm.disabled.len(), 2);
    }

    #[test]
    fn test_invalid_yaml_keeps_whole_body() {
        let content = "---\ntitle: [unclosed\n---\nbody";
        let (fm, body) = split(content);
        assert!(fm.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn test_not_at_start_is_not_frontmatter() {
        let content = "intro\n---\ntitle: x\n---\n";
        let (fm, body) = split(content);
        assert!(fm.title.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn test_scalar_document_is_not_frontmatter() {
        let content = "---\njust a string\n---\nbody";
        let (fm, body) = split(content);
        assert!(fm.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn test_raw_keeps_unknown_keys() {
        let (fm, _) = split("---\nauthor: me\ncount: 3\n---\n");
        assert_eq!(fm.raw["author"], Value::String("me".into()));
        assert_eq!(fm.raw["count"], serde_json::json!(3));
    }
}
