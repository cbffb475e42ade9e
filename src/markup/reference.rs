//! The `Reference` type: one occurrence of live markup in a document.

use std::ops::Range;

/// Kind tag, without payload. Used for partitioning and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    TemplateInline,
    TemplateUrl,
    MarkdownLink,
    Backlink,
    Span,
    Div,
    Exec,
    Query,
}

impl Kind {
    /// Kinds whose key is resolved by the template resolver.
    pub const fn is_template(self) -> bool {
        matches!(
            self,
            Self::TemplateInline | Self::TemplateUrl | Self::Span | Self::Div
        )
    }
}

/// Kind-specific payload of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    /// `` [`VALUE`](codebook:KEY) `` or `[VALUE](codebook:KEY)`
    Inline { value: String, key: String },
    /// `[TEXT](URL "codebook:KEY")`
    Url { label: String, url: String, key: String },
    /// `[TEXT](path/to/file.md)`
    MarkdownLink { label: String, path: String },
    /// `[TEXT](URL "codebook:backlink")`
    Backlink { label: String, url: String },
    /// `<span data-codebook="KEY">VALUE</span>`
    Span { key: String, value: String },
    /// `<div data-codebook="KEY">CONTENT</div>`
    Div { key: String, content: String },
    /// `<exec lang="LANG">CODE</exec>` followed by `<output>RESULT</output>`
    Exec { lang: String, code: String, output: String },
    /// `<cicada endpoint="NAME" ...>CONTENT</cicada>`
    Query {
        endpoint: String,
        attributes: Vec<(String, String)>,
        content: String,
    },
}

/// A single match found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Exact matched text
    pub raw: String,
    /// Byte offsets into the scanned text; only used for ordering
    pub span: Range<usize>,
    pub markup: Markup,
}

impl Reference {
    pub const fn kind(&self) -> Kind {
        match self.markup {
            Markup::Inline { .. } => Kind::TemplateInline,
            Markup::Url { .. } => Kind::TemplateUrl,
            Markup::MarkdownLink { .. } => Kind::MarkdownLink,
            Markup::Backlink { .. } => Kind::Backlink,
            Markup::Span { .. } => Kind::Span,
            Markup::Div { .. } => Kind::Div,
            Markup::Exec { .. } => Kind::Exec,
            Markup::Query { .. } => Kind::Query,
        }
    }

    /// Placeholder expression: template key, link path, source code or endpoint.
    pub fn key(&self) -> &str {
        match &self.markup {
            Markup::Inline { key, .. }
            | Markup::Url { key, .. }
            | Markup::Span { key, .. }
            | Markup::Div { key, .. } => key,
            Markup::MarkdownLink { path, .. } => path,
            Markup::Backlink { .. } => "backlink",
            Markup::Exec { code, .. } => code,
            Markup::Query { endpoint, .. } => endpoint,
        }
    }

    /// Value currently shown in the document.
    pub fn current_value(&self) -> &str {
        match &self.markup {
            Markup::Inline { value, .. } | Markup::Span { value, .. } => value,
            Markup::Url { url, .. } | Markup::Backlink { url, .. } => url,
            Markup::MarkdownLink { path, .. } => path,
            Markup::Div { content, .. } | Markup::Query { content, .. } => content,
            Markup::Exec { output, .. } => output,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match &self.markup {
            Markup::Url { label, .. }
            | Markup::MarkdownLink { label, .. }
            | Markup::Backlink { label, .. } => Some(label),
            _ => None,
        }
    }

    /// Render this reference with `value` in place of its current value.
    pub fn render(&self, value: &str) -> String {
        match &self.markup {
            Markup::Inline { key, .. } => render_inline(key, value),
            Markup::Url { label, key, .. } => render_url(label, value, key),
            Markup::MarkdownLink { label, .. } => format!("[{label}]({value})"),
            Markup::Backlink { label, .. } => render_backlink(label, value),
            Markup::Span { key, .. } => render_span(key, value),
            Markup::Div { key, .. } => render_div(key, value),
            Markup::Exec { lang, code, .. } => render_exec(lang, code, value),
            Markup::Query {
                endpoint,
                attributes,
                ..
            } => render_query(endpoint, attributes, value),
        }
    }
}

// ============================================================================
// Canonical renderings
// ============================================================================

pub fn render_inline(key: &str, value: &str) -> String {
    format!("[`{value}`](codebook:{key})")
}

pub fn render_url(label: &str, url: &str, key: &str) -> String {
    format!("[{label}]({url} \"codebook:{key}\")")
}

pub fn render_backlink(label: &str, url: &str) -> String {
    format!("[{label}]({url} \"codebook:backlink\")")
}

pub fn render_span(key: &str, value: &str) -> String {
    format!("<span data-codebook=\"{key}\">{value}</span>")
}

pub fn render_div(key: &str, content: &str) -> String {
    format!("<div data-codebook=\"{key}\">\n{content}\n</div>")
}

pub fn render_exec(lang: &str, code: &str, output: &str) -> String {
    format!("<exec lang=\"{lang}\">\n{code}\n</exec>\n<output>\n{output}\n</output>")
}

pub fn render_query(endpoint: &str, attributes: &[(String, String)], content: &str) -> String {
    let mut open = format!("<cicada endpoint=\"{endpoint}\"");
    for (name, value) in attributes {
        open.push_str(&format!(" {name}=\"{value}\""));
    }
    format!("{open}>\n{content}\n</cicada>")
}
