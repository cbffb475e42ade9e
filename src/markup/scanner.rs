//! Link scanner.
//!
//! Each markup form has its own matcher. All matchers run over the same text
//! and the results are merged by start offset, so iteration order is the
//! document order regardless of kind.

use super::reference::{Kind, Markup, Reference};
use regex::{Captures, Regex};
use rustc_hash::FxHashSet;
use std::sync::LazyLock;

// ============================================================================
// Patterns
// ============================================================================

/// `` [`VALUE`](codebook:KEY) `` or `[VALUE](codebook:KEY)`
pub(crate) static INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[`?([^`\]]*)`?\]\(codebook:([^)]+)\)").unwrap());

/// `[TEXT](URL "codebook:KEY")`; `link`/`backlink` keys are filtered after matching
pub(crate) static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([^\]]+)\]\(([^"\s]+)\s+"codebook:([^"]+)"\)"#).unwrap()
});

/// `[TEXT](path.md)` without a title
pub(crate) static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[([^\]]+)\]\(([^"\s)]+\.md)\)"#).unwrap());

/// `[TEXT](URL "codebook:backlink")`
pub(crate) static BACKLINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([^\]]+)\]\(([^"\s]+)\s+"codebook:backlink"\)"#).unwrap()
});

pub(crate) static SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span data-codebook="([^"]+)">([^<]*)</span>"#).unwrap()
});

pub(crate) static DIV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div data-codebook="([^"]+)">\n?(.*?)\n?</div>"#).unwrap()
});

pub(crate) static EXEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<exec lang="([^"]+)">\n?(.*?)\n?</exec>\s*\n<output>\n?(.*?)\n?</output>"#,
    )
    .unwrap()
});

pub(crate) static QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<cicada\s+([^>]+)>\n?(.*?)\n?</cicada>").unwrap());

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());

const DEFAULT_ENDPOINT: &str = "query";

// ============================================================================
// Scanning
// ============================================================================

/// Keys a `TemplateUrl` must not use: `link`, `backlink`, and anything that
/// starts with either followed by a non-word character (`link.x`).
pub(crate) fn is_reserved_url_key(key: &str) -> bool {
    ["backlink", "link"].iter().any(|word| {
        key.strip_prefix(word).is_some_and(|rest| {
            rest.chars()
                .next()
                .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
        })
    })
}

fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map_or("", |m| m.as_str())
}

fn collect(
    refs: &mut Vec<Reference>,
    re: &Regex,
    text: &str,
    build: impl Fn(&Captures) -> Option<Markup>,
) {
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(markup) = build(&caps) {
            refs.push(Reference {
                raw: whole.as_str().to_owned(),
                span: whole.range(),
                markup,
            });
        }
    }
}

/// Parse `name="value"` pairs, keeping first-seen order; a repeated name
/// keeps its first position and takes the last value.
pub fn parse_attributes(source: &str) -> Vec<(String, String)> {
    let mut attributes: Vec<(String, String)> = Vec::new();
    for caps in ATTRIBUTE.captures_iter(source) {
        let (name, value) = (group(&caps, 1), group(&caps, 2));
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value.to_owned(),
            None => attributes.push((name.to_owned(), value.to_owned())),
        }
    }
    attributes
}

/// Split `endpoint` out of a cicada attribute list.
fn split_endpoint(mut attributes: Vec<(String, String)>) -> (String, Vec<(String, String)>) {
    let endpoint = match attributes.iter().position(|(n, _)| n == "endpoint") {
        Some(i) => attributes.remove(i).1,
        None => DEFAULT_ENDPOINT.to_owned(),
    };
    (endpoint, attributes)
}

/// Find every reference in `text`, in document order.
pub fn scan(text: &str) -> Vec<Reference> {
    let mut refs = Vec::new();

    collect(&mut refs, &INLINE, text, |c| {
        Some(Markup::Inline {
            value: group(c, 1).to_owned(),
            key: group(c, 2).to_owned(),
        })
    });
    collect(&mut refs, &URL, text, |c| {
        let key = group(c, 3);
        (!is_reserved_url_key(key)).then(|| Markup::Url {
            label: group(c, 1).to_owned(),
            url: group(c, 2).to_owned(),
            key: key.to_owned(),
        })
    });
    collect(&mut refs, &MARKDOWN_LINK, text, |c| {
        Some(Markup::MarkdownLink {
            label: group(c, 1).to_owned(),
            path: group(c, 2).to_owned(),
        })
    });
    collect(&mut refs, &BACKLINK, text, |c| {
        Some(Markup::Backlink {
            label: group(c, 1).to_owned(),
            url: group(c, 2).to_owned(),
        })
    });
    collect(&mut refs, &SPAN, text, |c| {
        Some(Markup::Span {
            key: group(c, 1).to_owned(),
            value: group(c, 2).to_owned(),
        })
    });
    collect(&mut refs, &DIV, text, |c| {
        Some(Markup::Div {
            key: group(c, 1).to_owned(),
            content: group(c, 2).to_owned(),
        })
    });
    collect(&mut refs, &EXEC, text, |c| {
        Some(Markup::Exec {
            lang: group(c, 1).to_owned(),
            code: group(c, 2).to_owned(),
            output: group(c, 3).to_owned(),
        })
    });
    collect(&mut refs, &QUERY, text, |c| {
        let (endpoint, attributes) = split_endpoint(parse_attributes(group(c, 1)));
        Some(Markup::Query {
            endpoint,
            attributes,
            content: group(c, 2).to_owned(),
        })
    });

    // Stable: equal offsets keep matcher order
    refs.sort_by_key(|r| r.span.start);
    refs
}

/// Unique template keys in first-occurrence order.
pub fn template_keys(refs: &[Reference]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    refs.iter()
        .filter(|r| r.kind().is_template())
        .map(Reference::key)
        .filter(|key| seen.insert(*key))
        .map(str::to_owned)
        .collect()
}

/// Unique template keys of `text` in first-occurrence order.
pub fn find_templates(text: &str) -> Vec<String> {
    template_keys(&scan(text))
}

/// References of one kind.
pub fn of_kind(refs: &[Reference], kind: Kind) -> impl Iterator<Item = &Reference> {
    refs.iter().filter(move |r| r.kind() == kind)
}

/// 1-based line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
