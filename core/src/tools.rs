use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Tool definition as advertised to agents through `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: InputSchema,
}

/// Top-level argument schema of a tool. A constrained subset of JSON Schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertySchema>>,
}

/// REST call template. `path`, `query` and `body` may contain `{name}`
/// placeholders resolved against the call arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestTemplate {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// One agent-protocol tool paired with the REST call it performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMapping {
    pub mcp: ToolDefinition,
    pub rest: RestTemplate,
}

impl ToolMapping {
    pub fn name(&self) -> &str {
        &self.mcp.name
    }
}

/// Immutable, name-indexed set of tool mappings. Built once at startup and
/// shared read-only across every concurrent call.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolMapping>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolMapping>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if tool.name().trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tool mapping #{position} has an empty name"
                )));
            }
            if index.insert(tool.name().to_string(), position).is_some() {
                return Err(ConfigError::DuplicateTool(tool.name().to_string()));
            }
        }
        Ok(Self { tools, index })
    }

    /// Not-found is an ordinary outcome, surfaced by callers as an application error.
    pub fn find_by_name(&self, name: &str) -> Option<&ToolMapping> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.mcp.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolMapping> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
