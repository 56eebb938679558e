//! Argument validation against a tool's input schema.
//!
//! Only required-ness and the top-level JSON kind are checked. Unknown
//! argument keys and unknown declared types pass, and a null value passes
//! the type check (nullability is enforced by the required check alone).

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::ToolDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field '{0}' is missing")]
    Missing(String),
    #[error("Required field '{0}' cannot be null")]
    Null(String),
    #[error("Field '{field}' has invalid type. Expected: {expected}")]
    InvalidType { field: String, expected: String },
}

pub fn validate_arguments(
    tool: &ToolDefinition,
    arguments: &Map<String, Value>,
) -> Result<(), ValidationError> {
    let schema = &tool.input_schema;

    for field in &schema.required {
        match arguments.get(field) {
            None => return Err(ValidationError::Missing(field.clone())),
            Some(Value::Null) => return Err(ValidationError::Null(field.clone())),
            Some(_) => {}
        }
    }

    for (key, value) in arguments {
        let Some(expected) = schema
            .properties
            .get(key)
            .and_then(|property| property.schema_type.as_deref())
        else {
            continue;
        };
        if !matches_type(value, expected) {
            return Err(ValidationError::InvalidType {
                field: key.clone(),
                expected: expected.to_string(),
            });
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    if value.is_null() {
        return true;
    }
    match expected.to_ascii_lowercase().as_str() {
        "string" => value.is_string(),
        "number" | "integer" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}
