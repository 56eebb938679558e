//! `$ref` resolution over a parsed OpenAPI document.
//!
//! References are followed to their concrete target and the target is
//! inlined at the referencing location. Cycles are cut with a set of the
//! references currently on the descent path: a reference that is already
//! being resolved further up is inlined as a snapshot of its target without
//! descending into it again. Membership is popped on the way back up, so a
//! schema reached through two unrelated routes is fully resolved on both.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("reference '{0}' does not point into this document")]
    External(String),
    #[error("reference '{0}' cannot be resolved")]
    Dangling(String),
    #[error("reference '{0}' only refers back to itself")]
    Circular(String),
}

/// Child keys holding a single nested schema.
const SCHEMA_KEYS: [&str; 3] = ["items", "not", "additionalProperties"];
/// Child keys holding a list of nested schemas.
const COMPOSITION_KEYS: [&str; 3] = ["allOf", "anyOf", "oneOf"];

pub fn lookup<'d>(document: &'d Value, reference: &str) -> Result<&'d Value, ResolveError> {
    let Some(pointer) = reference.strip_prefix('#') else {
        return Err(ResolveError::External(reference.to_string()));
    };
    document
        .pointer(pointer)
        .ok_or_else(|| ResolveError::Dangling(reference.to_string()))
}

/// Follow a chain of `$ref`s (parameters, request bodies) to the first
/// concrete node, without resolving anything nested inside it.
pub fn follow<'d>(document: &'d Value, value: &'d Value) -> Result<&'d Value, ResolveError> {
    let mut current = value;
    let mut seen: Vec<&str> = Vec::new();
    while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
        if seen.contains(&reference) {
            return Err(ResolveError::Circular(reference.to_string()));
        }
        seen.push(reference);
        current = lookup(document, reference)?;
    }
    Ok(current)
}

pub struct SchemaResolver<'d> {
    document: &'d Value,
    active: HashSet<String>,
}

impl<'d> SchemaResolver<'d> {
    pub fn new(document: &'d Value) -> Self {
        Self {
            document,
            active: HashSet::new(),
        }
    }

    pub fn resolve(&mut self, schema: &Value) -> Result<Value, ResolveError> {
        let Value::Object(map) = schema else {
            return Ok(schema.clone());
        };

        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            let target = lookup(self.document, reference)?;
            if self.active.contains(reference) {
                if target.get("$ref").is_some() {
                    return Err(ResolveError::Circular(reference.to_string()));
                }
                return Ok(target.clone());
            }
            self.active.insert(reference.to_string());
            let resolved = self.resolve(target);
            self.active.remove(reference);
            return resolved;
        }

        let mut resolved = map.clone();
        for key in SCHEMA_KEYS {
            if let Some(child) = map.get(key).filter(|child| child.is_object()) {
                resolved.insert(key.to_string(), self.resolve(child)?);
            }
        }
        if let Some(properties) = map.get("properties").and_then(Value::as_object) {
            let mut out = Map::with_capacity(properties.len());
            for (name, property) in properties {
                out.insert(name.clone(), self.resolve(property)?);
            }
            resolved.insert("properties".to_string(), Value::Object(out));
        }
        for key in COMPOSITION_KEYS {
            if let Some(list) = map.get(key).and_then(Value::as_array) {
                let items = list
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<Vec<_>, _>>()?;
                resolved.insert(key.to_string(), Value::Array(items));
            }
        }
        Ok(Value::Object(resolved))
    }
}
