//! `{name}` placeholder rendering for REST call templates.
//!
//! Placeholders are found by a single-token scanner: `{` followed by one or
//! more name characters and a closing `}`. Anything else, including the
//! braces of a JSON object literal, is copied through unchanged.

use std::collections::HashMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};
use toolgate_core::tools::RestTemplate;

/// Everything except RFC 3986 unreserved characters is escaped in path position.
const PATH_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A REST call with every template rendered, ready to join onto a base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCall {
    pub method: String,
    /// Relative reference without a leading `/`, with `?query` appended when present.
    pub target: String,
    pub body: Option<String>,
}

pub fn render_call(template: &RestTemplate, arguments: &Map<String, Value>) -> RenderedCall {
    let path = render_path(&template.path, arguments);
    let path = path.strip_prefix('/').unwrap_or(&path);
    let target = match &template.query {
        Some(query) => format!("{path}?{}", render_query(query, arguments)),
        None => path.to_string(),
    };
    RenderedCall {
        method: template.method.to_ascii_uppercase(),
        target,
        body: template
            .body
            .as_deref()
            .map(|body| render_body(body, arguments)),
    }
}

pub fn render_path(template: &str, arguments: &Map<String, Value>) -> String {
    substitute(template, |name| {
        let text = display_text(arguments.get(name));
        utf8_percent_encode(&text, PATH_VALUE).to_string()
    })
}

pub fn render_query(template: &str, arguments: &Map<String, Value>) -> String {
    substitute(template, |name| display_text(arguments.get(name)))
}

pub fn render_body(template: &str, arguments: &Map<String, Value>) -> String {
    substitute(template, |name| match arguments.get(name) {
        Some(value) => value.to_string(),
        None => "null".to_string(),
    })
}

/// Names of every placeholder in `template`, in order of appearance.
fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    scan(template, |segment| {
        if let Segment::Placeholder(name) = segment {
            names.push(name);
        }
    });
    names
}

fn display_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Two passes: resolve each distinct placeholder once, then splice the
/// values into the text.
fn substitute(template: &str, mut value_of: impl FnMut(&str) -> String) -> String {
    let mut values: HashMap<&str, String> = HashMap::new();
    for name in placeholders(template) {
        if !values.contains_key(name) {
            let value = value_of(name);
            values.insert(name, value);
        }
    }

    let mut out = String::with_capacity(template.len());
    scan(template, |segment| match segment {
        Segment::Text(text) => out.push_str(text),
        Segment::Placeholder(name) => {
            if let Some(value) = values.get(name) {
                out.push_str(value);
            }
        }
    });
    out
}

fn scan<'a>(template: &'a str, mut emit: impl FnMut(Segment<'a>)) {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        emit(Segment::Text(&rest[..open]));
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                emit(Segment::Placeholder(&after[..close]));
                rest = &after[close + 1..];
            }
            _ => {
                emit(Segment::Text("{"));
                rest = after;
            }
        }
    }
    emit(Segment::Text(rest));
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("arguments must be an object")
    }

    #[test]
    fn path_values_are_percent_encoded() {
        let rendered = render_path(
            "/search/{term}/{id}",
            &args(json!({"term": "hello world & x", "id": 42})),
        );
        assert_eq!(rendered, "/search/hello%20world%20%26%20x/42");
        assert_eq!(
            render_path("/files/{name}", &args(json!({"name": "a/b?c#d~e.f"}))),
            "/files/a%2Fb%3Fc%23d~e.f"
        );
    }

    #[test]
    fn query_values_are_inserted_raw_and_missing_ones_are_empty() {
        let rendered = render_query(
            "q={q}&limit={limit}&flag={flag}",
            &args(json!({"q": "a b&c", "flag": true})),
        );
        assert_eq!(rendered, "q=a b&c&limit=&flag=true");
    }

    #[test]
    fn body_values_are_raw_json_and_missing_ones_are_null() {
        let rendered = render_body(
            r#"{ "message": {message}, "loud": {loud}, "tags": {tags}, "extra": {extra} }"#,
            &args(json!({"message": "hi \"there\"", "loud": false, "tags": ["a", 1]})),
        );
        assert_eq!(
            rendered,
            r#"{ "message": "hi \"there\"", "loud": false, "tags": ["a",1], "extra": null }"#
        );
        let parsed: Value = serde_json::from_str(&rendered).expect("rendered body is JSON");
        assert_eq!(parsed["extra"], Value::Null);
    }

    #[test]
    fn non_placeholder_braces_are_kept() {
        let arguments = args(json!({"x": 1}));
        assert_eq!(render_query("a={}&b={x y}&c={x}", &arguments), "a={}&b={x y}&c=1");
        assert_eq!(render_body("{{x}}", &arguments), "{1}");
        assert_eq!(placeholders(r#"{ "a": {a}, "b.c": {b.c} }"#), vec!["a", "b.c"]);
    }

    #[test]
    fn repeated_placeholders_are_resolved_once() {
        let mut lookups = Vec::new();
        let rendered = substitute("/{id}/copies/{id}/{other}", |name| {
            lookups.push(name.to_string());
            name.to_uppercase()
        });
        assert_eq!(rendered, "/ID/copies/ID/OTHER");
        assert_eq!(lookups, vec!["id", "other"]);
    }

    #[test]
    fn call_strips_leading_slash_and_appends_query() {
        let template = RestTemplate {
            method: "get".to_string(),
            path: "/users/{id}".to_string(),
            query: Some("expand={expand}".to_string()),
            body: None,
        };
        let rendered = render_call(&template, &args(json!({"id": "a b", "expand": "posts"})));
        assert_eq!(
            rendered,
            RenderedCall {
                method: "GET".to_string(),
                target: "users/a%20b?expand=posts".to_string(),
                body: None,
            }
        );
    }
}
