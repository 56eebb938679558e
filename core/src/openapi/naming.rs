use std::sync::LazyLock;

use regex::Regex;

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel boundary regex"));
static NON_SNAKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]").expect("valid non-snake regex"));
static REPEATED_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid separator regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("valid non-word regex"));

/// Tool name for an operation: the snake-cased `operationId` when declared,
/// otherwise `<method>_<path>` with separators and braces flattened.
pub fn tool_name(operation_id: Option<&str>, method: &str, path: &str) -> String {
    if let Some(operation_id) = operation_id.filter(|id| !id.trim().is_empty()) {
        return to_snake_case(operation_id);
    }

    let path_part = path.trim_matches('/').replace('/', "_").replace(['{', '}'], " ");
    let path_part = WHITESPACE.replace_all(&path_part, "_");
    let path_part = NON_WORD.replace_all(&path_part, "");
    to_snake_case(&format!("{}_{}", method.to_ascii_lowercase(), path_part))
}

pub fn to_snake_case(text: &str) -> String {
    let split = CAMEL_BOUNDARY.replace_all(text, "${1}_${2}").to_lowercase();
    let cleaned = NON_SNAKE.replace_all(&split, "_");
    let collapsed = REPEATED_SEPARATOR.replace_all(&cleaned, "_");
    collapsed.trim_matches('_').to_string()
}
