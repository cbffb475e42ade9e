//! jq filtering over JSON query results.
//!
//! `<cicada jq="...">` attributes are full jq programs, compiled with the
//! jaq standard library, so pipes, `select(...)`, `map(...)`, `length` and
//! the other built-ins all work.

use jaq_core::{
    Compiler, Ctx, RcIter,
    load::{Arena, File, Loader},
};
use jaq_json::Val;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("cannot parse jq program `{0}`")]
    Syntax(String),

    #[error("cannot compile jq program `{0}`")]
    Compile(String),

    #[error("jq program `{0}` failed: {1}")]
    Runtime(String, String),
}

/// Every value the program produces, in order.
pub fn evaluate(expression: &str, data: &Value) -> Result<Vec<Value>, ExtractError> {
    let program = File {
        code: expression,
        path: (),
    };
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = Arena::default();
    let modules = loader
        .load(&arena, program)
        .map_err(|_| ExtractError::Syntax(expression.to_owned()))?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|_| ExtractError::Compile(expression.to_owned()))?;

    let inputs = RcIter::new(core::iter::empty());
    filter
        .run((Ctx::new([], &inputs), Val::from(data.clone())))
        .map(|result| {
            result
                .map(Value::from)
                .map_err(|err| ExtractError::Runtime(expression.to_owned(), format!("{err:?}")))
        })
        .collect()
}

/// One result stays scalar, several become a list, none is `None`.
pub fn extract(expression: &str, data: &Value) -> Result<Option<Value>, ExtractError> {
    let expression = expression.trim();
    if expression.is_empty() || expression == "." {
        return Ok(Some(data.clone()));
    }
    let mut results = evaluate(expression, data)?;
    Ok(match results.len() {
        0 => None,
        1 => results.pop(),
        _ => Some(Value::Array(results)),
    })
}

/// Format an extracted value for a markdown document.
pub fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("  \n"),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity() {
        let data = json!({"a": 1});
        assert_eq!(extract(".", &data).unwrap(), Some(data.clone()));
        assert_eq!(extract("", &data).unwrap(), Some(data));
    }

    #[test]
    fn test_nested_field() {
        let data = json!({"a": {"b": 1}});
        assert_eq!(extract(".a.b", &data).unwrap(), Some(json!(1)));
        assert_eq!(extract(".a.missing", &data).unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_comma() {
        let data = json!({"x": 1, "y": 2});
        assert_eq!(extract(".x, .y", &data).unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn test_iterate_and_index() {
        let data = json!({"items": [{"x": 1}, {"x": 2}]});
        assert_eq!(extract(".items[].x", &data).unwrap(), Some(json!([1, 2])));
        assert_eq!(extract(".items[0].x", &data).unwrap(), Some(json!(1)));
        assert_eq!(extract(".items[-1].x", &data).unwrap(), Some(json!(2)));
        assert_eq!(extract(".items[]", &json!({"items": []})).unwrap(), None);
    }

    #[test]
    fn test_pipe_and_select() {
        let data = json!({"items": [{"x": 1}, {"x": 2}, {"x": 3}]});
        assert_eq!(
            extract(".items[] | select(.x > 2)", &data).unwrap(),
            Some(json!({"x": 3}))
        );
        assert_eq!(
            extract(".items[] | select(.x > 1) | .x", &data).unwrap(),
            Some(json!([2, 3]))
        );
    }

    #[test]
    fn test_builtins() {
        let data = json!({"items": [{"name": "b"}, {"name": "a"}]});
        assert_eq!(extract(".items | length", &data).unwrap(), Some(json!(2)));
        assert_eq!(
            extract("[.items[].name] | sort", &data).unwrap(),
            Some(json!(["a", "b"]))
        );
        assert_eq!(
            extract(".items | map(.name)", &data).unwrap(),
            Some(json!(["b", "a"]))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            extract(".a[", &json!({})),
            Err(ExtractError::Syntax(".a[".into()))
        );
        assert_eq!(
            extract("nosuchfn", &json!({})),
            Err(ExtractError::Compile("nosuchfn".into()))
        );
        assert!(matches!(
            extract(".a.b", &json!({"a": 3})),
            Err(ExtractError::Runtime(..))
        ));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(None), "");
        assert_eq!(format_value(Some(&Value::Null)), "");
        assert_eq!(format_value(Some(&json!("text"))), "text");
        assert_eq!(format_value(Some(&json!(42))), "42");
        assert_eq!(format_value(Some(&json!(true))), "true");
        assert_eq!(format_value(Some(&json!(["a", "b"]))), "a  \nb");
        assert_eq!(format_value(Some(&json!([1, 2]))), "[\n  1,\n  2\n]");
        assert_eq!(format_value(Some(&json!({"k": "v"}))), "{\n  \"k\": \"v\"\n}");
    }
}
