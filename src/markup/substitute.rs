//! Value substitution.
//!
//! Every template kind is rewritten with a global regex replace. Keys that
//! have no resolved value keep their exact original text.

use super::{
    reference::{render_div, render_inline, render_span, render_url},
    scanner::{DIV, INLINE, SPAN, URL, is_reserved_url_key},
};
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

pub type Values = FxHashMap<String, String>;

fn replace_kind(
    text: &str,
    re: &Regex,
    key_group: usize,
    values: &Values,
    render: impl Fn(&Captures, &str) -> Option<String>,
) -> String {
    re.replace_all(text, |caps: &Captures| {
        let original = caps.get(0).map_or("", |m| m.as_str());
        let key = caps.get(key_group).map_or("", |m| m.as_str());
        values
            .get(key)
            .and_then(|value| render(caps, value))
            .unwrap_or_else(|| original.to_owned())
    })
    .into_owned()
}

fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map_or("", |m| m.as_str())
}

/// Rewrite every template reference whose key has a value.
pub fn replace_values(text: &str, values: &Values) -> String {
    if values.is_empty() {
        return text.to_owned();
    }

    let text = replace_kind(text, &INLINE, 2, values, |caps, value| {
        Some(render_inline(group(caps, 2), value))
    });
    let text = replace_kind(&text, &URL, 3, values, |caps, value| {
        let key = group(caps, 3);
        (!is_reserved_url_key(key)).then(|| render_url(group(caps, 1), value, key))
    });
    let text = replace_kind(&text, &SPAN, 1, values, |caps, value| {
        Some(render_span(group(caps, 1), value))
    });
    replace_kind(&text, &DIV, 1, values, |caps, value| {
        Some(render_div(group(caps, 1), value))
    })
}
