//! `<cicada>` blocks: run each query and splice the presented result back.

use crate::{
    log,
    markup::{Markup, scanner::scan},
    resolve::{
        QueryError, QueryExecutor, QueryResponse,
        extract::{extract, format_value},
    },
};

fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Fence language for `render="code"` / `render="code[LANG]"`.
fn code_lang<'a>(mode: &'a str, attributes: &'a [(String, String)]) -> &'a str {
    mode.strip_prefix("code[")
        .and_then(|rest| rest.strip_suffix(']'))
        .or_else(|| attribute(attributes, "lang"))
        .unwrap_or_default()
}

/// Block content for a successful response, after `jq` and `render`.
pub fn present(response: &QueryResponse, attributes: &[(String, String)]) -> String {
    let jq = attribute(attributes, "jq").filter(|e| !e.trim().is_empty());
    let mut content = match (jq, &response.data) {
        (Some(expression), Some(data)) => match extract(expression, data) {
            Ok(value) => format_value(value.as_ref()),
            Err(err) => {
                log!("cicada"; "invalid jq expression `{expression}`: {err}");
                String::new()
            }
        },
        _ => response.content.clone(),
    };

    if let Some(mode) = attribute(attributes, "render")
        && mode.starts_with("code")
    {
        let lang = code_lang(mode, attributes);
        content = format!("\n```{lang}\n{content}\n```");
    }
    content
}

/// Run every query block of `text`. Returns the new text and the number of
/// successful queries.
pub fn execute_queries(text: &str, queries: &mut dyn QueryExecutor) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut executed = 0;

    for reference in scan(text) {
        let Markup::Query {
            endpoint,
            attributes,
            ..
        } = &reference.markup
        else {
            continue;
        };

        let content = match queries.execute_query(endpoint, attributes) {
            Ok(response) => {
                executed += 1;
                present(&response, attributes)
            }
            Err(QueryError::UnknownEndpoint(name)) => {
                log!("cicada"; "unknown endpoint `{name}`, block left as is");
                continue;
            }
            Err(err) => {
                log!("cicada"; "query `{endpoint}` failed: {err}");
                format!("Error: {err}")
            }
        };

        out.push_str(&text[last..reference.span.start]);
        if content == reference.current_value() {
            out.push_str(&reference.raw);
        } else {
            out.push_str(&reference.render(&content));
        }
        last = reference.span.end;
    }

    out.push_str(&text[last..]);
    (out, executed)
}
