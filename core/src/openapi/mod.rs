//! Schema-driven tool generation.
//!
//! Turns an OpenAPI 3.x or Swagger 2.0 document (JSON or YAML) into tool
//! mappings plus an inferred REST base address. Structural problems with the
//! document abort the conversion; a single operation that cannot be converted
//! is skipped with a warning.

mod naming;
mod resolve;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ConvertError;
use crate::tools::{InputSchema, PropertySchema, RestTemplate, ToolDefinition, ToolMapping};

pub use naming::{to_snake_case, tool_name};
pub use resolve::ResolveError;
use resolve::{SchemaResolver, follow};

/// Operation keys of a path item, in emission order.
const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Property that carries a request body whose schema is not an object.
pub const REQUEST_BODY_PROPERTY: &str = "requestBody";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    OpenApi3,
    Swagger2,
}

/// Result of converting one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub kind: DocumentKind,
    pub base_address: Option<String>,
    pub tools: Vec<ToolMapping>,
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
struct MappingsDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    rest: Option<RestSection<'a>>,
    tools: &'a [ToolMapping],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestSection<'a> {
    base_address: &'a str,
}

impl Conversion {
    /// The conversion as a configuration layer: `{"rest": {"baseAddress"}?, "tools": [...]}`.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let document = MappingsDocument {
            rest: self
                .base_address
                .as_deref()
                .map(|base_address| RestSection { base_address }),
            tools: &self.tools,
        };
        serde_json::to_string_pretty(&document)
    }
}

#[derive(Debug, Error)]
enum OperationError {
    #[error("operation is not an object")]
    NotAnObject,
    #[error(transparent)]
    Reference(#[from] ResolveError),
}

/// Parse document text as JSON when it looks like JSON, otherwise as YAML.
pub fn parse_document(text: &str) -> Result<Value, ConvertError> {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with('{') || text.starts_with('[') {
        return serde_json::from_str(text)
            .map_err(|e| ConvertError::Parse(format!("invalid JSON: {e}")));
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| ConvertError::Parse(format!("invalid YAML: {e}")))?;
    Ok(yaml_to_json(yaml))
}

/// YAML allows non-string mapping keys (`200:` under `responses`), so the
/// value is converted by hand with keys stringified.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(flag) => Value::Bool(flag),
        serde_yaml::Value::Number(number) => {
            if let Some(n) = number.as_i64() {
                Value::from(n)
            } else if let Some(n) = number.as_u64() {
                Value::from(n)
            } else {
                number
                    .as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(text) => Value::String(text),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(text) => text,
                    serde_yaml::Value::Number(number) => number.to_string(),
                    serde_yaml::Value::Bool(flag) => flag.to_string(),
                    _ => continue,
                };
                out.insert(key, yaml_to_json(value));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

pub fn convert(text: &str) -> Result<Conversion, ConvertError> {
    let document = parse_document(text)?;
    convert_document(&document)
}

pub fn convert_document(document: &Value) -> Result<Conversion, ConvertError> {
    let (kind, mut warnings) = inspect(document)?;
    for warning in &warnings {
        tracing::warn!(warning = %warning, "OpenAPI document warning");
    }

    let mut tools: Vec<ToolMapping> = Vec::new();
    let mut names = HashSet::new();
    let paths = document
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| ConvertError::Structure(vec!["missing 'paths' object".to_string()]))?;

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            warn(&mut warnings, format!("Skipping path '{path}': path item is not an object"));
            continue;
        };
        let shared = item.get("parameters");
        for method in OPERATION_METHODS {
            let Some(operation) = item.get(method) else {
                continue;
            };
            match convert_operation(document, kind, path, method, operation, shared) {
                Ok(tool) => {
                    if !names.insert(tool.name().to_string()) {
                        warn(
                            &mut warnings,
                            format!(
                                "Skipping {} {path}: tool name '{}' is already taken",
                                method.to_ascii_uppercase(),
                                tool.name()
                            ),
                        );
                        continue;
                    }
                    tracing::debug!(tool = %tool.name(), method, path = %path, "Converted operation");
                    tools.push(tool);
                }
                Err(e) => warn(
                    &mut warnings,
                    format!("Skipping {} {path}: {e}", method.to_ascii_uppercase()),
                ),
            }
        }
    }

    Ok(Conversion {
        kind,
        base_address: base_address(document, kind),
        tools,
        warnings,
    })
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!(warning = %message, "OpenAPI conversion warning");
    warnings.push(message);
}

fn version_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Hard structural checks. Returns the document kind plus soft warnings.
fn inspect(document: &Value) -> Result<(DocumentKind, Vec<String>), ConvertError> {
    let Some(root) = document.as_object() else {
        return Err(ConvertError::Structure(vec![
            "document root must be an object".to_string(),
        ]));
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let kind = if let Some(version) = root.get("openapi") {
        match version_text(version) {
            Some(version) => {
                if !version.starts_with("3.") {
                    warnings.push(format!(
                        "unsupported OpenAPI version '{version}', converting as 3.x"
                    ));
                }
                Some(DocumentKind::OpenApi3)
            }
            None => {
                errors.push("'openapi' version must be a string".to_string());
                None
            }
        }
    } else if let Some(version) = root.get("swagger") {
        match version_text(version) {
            Some(version) => {
                if version != "2.0" && version != "2" {
                    warnings.push(format!(
                        "unsupported Swagger version '{version}', converting as 2.0"
                    ));
                }
                Some(DocumentKind::Swagger2)
            }
            None => {
                errors.push("'swagger' version must be a string".to_string());
                None
            }
        }
    } else {
        errors.push("missing 'openapi' or 'swagger' version field".to_string());
        None
    };

    match root.get("paths") {
        Some(Value::Object(_)) => {}
        Some(_) => errors.push("'paths' must be an object".to_string()),
        None => errors.push("missing 'paths' object".to_string()),
    }

    match kind {
        Some(kind) if errors.is_empty() => Ok((kind, warnings)),
        _ => Err(ConvertError::Structure(errors)),
    }
}

fn base_address(document: &Value, kind: DocumentKind) -> Option<String> {
    match kind {
        DocumentKind::OpenApi3 => document
            .pointer("/servers/0/url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
        DocumentKind::Swagger2 => {
            let base_path = document
                .get("basePath")
                .and_then(Value::as_str)
                .unwrap_or_default();
            match document.get("host").and_then(Value::as_str) {
                Some(host) if !host.trim().is_empty() => {
                    let scheme = document
                        .pointer("/schemes/0")
                        .and_then(Value::as_str)
                        .unwrap_or("https");
                    Some(format!("{scheme}://{}{base_path}", host.trim()))
                }
                _ => (!base_path.is_empty() && base_path != "/").then(|| base_path.to_string()),
            }
        }
    }
}

struct BodySpec<'d> {
    schema: &'d Value,
    required: bool,
}

fn convert_operation(
    document: &Value,
    kind: DocumentKind,
    path: &str,
    method: &str,
    operation: &Value,
    shared: Option<&Value>,
) -> Result<ToolMapping, OperationError> {
    let operation = operation.as_object().ok_or(OperationError::NotAnObject)?;
    let parameters = collect_parameters(document, shared, operation.get("parameters"))?;

    let name = tool_name(
        operation.get("operationId").and_then(Value::as_str),
        method,
        path,
    );
    let description = text_field(operation, "summary")
        .or_else(|| text_field(operation, "description"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {path}", method.to_ascii_uppercase()));

    let mut resolver = SchemaResolver::new(document);
    let mut properties = BTreeMap::new();
    let mut required = Vec::new();
    let mut query = Vec::new();
    let mut body = None;

    let body_spec = match kind {
        DocumentKind::OpenApi3 => request_body(document, operation)?,
        DocumentKind::Swagger2 => parameters
            .iter()
            .find(|parameter| text_field(parameter, "in") == Some("body"))
            .and_then(|parameter| {
                parameter.get("schema").map(|schema| BodySpec {
                    schema,
                    required: flag(parameter, "required"),
                })
            }),
    };

    if let Some(spec) = body_spec {
        let resolved = resolver.resolve(spec.schema)?;
        let schema = unwrap_single_all_of(&resolved);
        if is_object_schema(schema) {
            let body_properties = schema.get("properties").and_then(Value::as_object);
            let mut pairs = Vec::new();
            for (property_name, property) in body_properties.into_iter().flatten() {
                properties.insert(property_name.clone(), property_schema(property));
                pairs.push(format!(
                    "{}: {{{property_name}}}",
                    Value::String(property_name.clone())
                ));
            }
            for field in schema
                .get("required")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
            {
                push_unique(&mut required, field);
            }
            body = Some(if pairs.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", pairs.join(", "))
            });
        } else {
            properties.insert(REQUEST_BODY_PROPERTY.to_string(), property_schema(schema));
            if spec.required {
                push_unique(&mut required, REQUEST_BODY_PROPERTY);
            }
            body = Some(format!("{{{REQUEST_BODY_PROPERTY}}}"));
        }
    }

    for parameter in &parameters {
        let Some(parameter_name) = text_field(parameter, "name").filter(|n| !n.is_empty()) else {
            continue;
        };
        let location = text_field(parameter, "in").unwrap_or_default();
        match location {
            "body" => continue,
            "path" | "query" | "header" | "cookie" => {}
            other => {
                tracing::warn!(
                    parameter = parameter_name,
                    location = other,
                    path,
                    method,
                    "Unsupported parameter location, parameter ignored"
                );
                continue;
            }
        }
        let Some(schema) = parameter_schema(kind, parameter) else {
            continue;
        };
        let resolved = resolver.resolve(&schema)?;
        let mut property = property_schema(unwrap_single_all_of(&resolved));
        if let Some(description) = text_field(parameter, "description") {
            property.description = Some(description.to_string());
        }
        properties.insert(parameter_name.to_string(), property);
        if flag(parameter, "required") {
            push_unique(&mut required, parameter_name);
        }
        if location == "query" {
            query.push(format!("{parameter_name}={{{parameter_name}}}"));
        }
    }

    Ok(ToolMapping {
        mcp: ToolDefinition {
            name,
            title: None,
            description: Some(description),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties,
                required,
            },
        },
        rest: RestTemplate {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: (!query.is_empty()).then(|| query.join("&")),
            body,
        },
    })
}

/// Path-level parameters merged with operation parameters; the operation
/// wins when name and location clash.
fn collect_parameters<'d>(
    document: &'d Value,
    shared: Option<&'d Value>,
    own: Option<&'d Value>,
) -> Result<Vec<&'d Map<String, Value>>, ResolveError> {
    let mut merged: Vec<&Map<String, Value>> = Vec::new();
    for list in [shared, own].into_iter().flatten() {
        let Some(list) = list.as_array() else {
            continue;
        };
        for raw in list {
            let Some(parameter) = follow(document, raw)?.as_object() else {
                continue;
            };
            let key = (text_field(parameter, "name"), text_field(parameter, "in"));
            match merged
                .iter()
                .position(|existing| (text_field(existing, "name"), text_field(existing, "in")) == key)
            {
                Some(position) => merged[position] = parameter,
                None => merged.push(parameter),
            }
        }
    }
    Ok(merged)
}

fn request_body<'d>(
    document: &'d Value,
    operation: &'d Map<String, Value>,
) -> Result<Option<BodySpec<'d>>, ResolveError> {
    let Some(raw) = operation.get("requestBody") else {
        return Ok(None);
    };
    let body = follow(document, raw)?;
    let Some(content) = body.get("content").and_then(Value::as_object) else {
        return Ok(None);
    };
    let media = content.get("application/json").or_else(|| {
        content
            .iter()
            .find(|(media_type, _)| media_type.contains("json"))
            .map(|(_, media)| media)
    });
    Ok(media.and_then(|media| media.get("schema")).map(|schema| BodySpec {
        schema,
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
    }))
}

fn parameter_schema(kind: DocumentKind, parameter: &Map<String, Value>) -> Option<Value> {
    if let Some(schema) = parameter.get("schema") {
        return Some(schema.clone());
    }
    if let Some(schema) = parameter
        .get("content")
        .and_then(Value::as_object)
        .and_then(|content| content.values().find_map(|media| media.get("schema")))
    {
        return Some(schema.clone());
    }
    if kind == DocumentKind::Swagger2 && parameter.contains_key("type") {
        let mut inline = Map::new();
        for key in ["type", "format", "items", "enum", "description"] {
            if let Some(value) = parameter.get(key) {
                inline.insert(key.to_string(), value.clone());
            }
        }
        return Some(Value::Object(inline));
    }
    None
}

fn unwrap_single_all_of(schema: &Value) -> &Value {
    if schema.get("type").is_none() && schema.get("properties").is_none() {
        if let Some([only]) = schema.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return unwrap_single_all_of(only);
        }
    }
    schema
}

/// First non-null entry of `type`, which may be a string or a list.
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null"),
        _ => None,
    }
}

fn is_object_schema(schema: &Value) -> bool {
    match schema_type(schema) {
        Some(kind) => kind == "object",
        None => schema.get("properties").is_some_and(Value::is_object),
    }
}

fn property_schema(schema: &Value) -> PropertySchema {
    let schema = unwrap_single_all_of(schema);
    let schema_type = schema_type(schema).map(str::to_string).or_else(|| {
        schema
            .get("properties")
            .is_some_and(Value::is_object)
            .then(|| "object".to_string())
    });
    PropertySchema {
        schema_type,
        description: schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        format: schema.get("format").and_then(Value::as_str).map(str::to_string),
        enum_values: schema.get("enum").and_then(Value::as_array).cloned(),
        items: schema
            .get("items")
            .filter(|items| items.is_object())
            .map(|items| Box::new(property_schema(items))),
        properties: schema.get("properties").and_then(Value::as_object).map(|properties| {
            properties
                .iter()
                .map(|(name, property)| (name.clone(), property_schema(property)))
                .collect()
        }),
    }
}

fn text_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}
