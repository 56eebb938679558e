//! Gateway configuration: the resolved, immutable object every transport
//! consumes, plus the layered loader that builds it from JSON files.
//!
//! Layers are folded left to right. A scalar present in a later layer wins,
//! header maps merge key by key, and tool lists merge by tool name with the
//! later layer taking precedence.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mcp::{DEFAULT_PROTOCOL_VERSION, ServerInfo};
use crate::tools::{ToolMapping, ToolRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub rest: RestSettings,
    pub protocol_version: String,
    pub server_info: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub tools: Vec<ToolMapping>,
    pub authorization: AuthorizationSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rest: RestSettings::default(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            server_info: ServerInfo::default(),
            instructions: None,
            tools: Vec::new(),
            authorization: AuthorizationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestSettings {
    pub base_address: String,
    pub default_headers: BTreeMap<String, String>,
    /// Inbound header name -> whether to copy it onto outbound REST calls.
    pub forwarded_headers: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl RestSettings {
    pub fn forwarded_header_names(&self) -> impl Iterator<Item = &str> {
        self.forwarded_headers
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorizationSettings {
    pub require_authorization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_metadata: Option<ProtectedResourceMetadata>,
}

/// OAuth protected resource metadata (RFC 9728), served verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    #[serde(default = "default_bearer_methods")]
    pub bearer_methods_supported: Vec<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
}

fn default_bearer_methods() -> Vec<String> {
    vec!["header".to_string()]
}

/// One configuration source with every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    pub rest: Option<RestLayer>,
    pub protocol_version: Option<String>,
    pub server_info: Option<ServerInfo>,
    pub instructions: Option<String>,
    pub tools: Option<Vec<ToolMapping>>,
    pub authorization: Option<AuthorizationLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestLayer {
    pub base_address: Option<String>,
    pub default_headers: Option<BTreeMap<String, String>>,
    pub forwarded_headers: Option<BTreeMap<String, bool>>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationLayer {
    pub require_authorization: Option<bool>,
    pub resource_metadata: Option<ProtectedResourceMetadata>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl GatewayConfig {
    /// Fold settings files, then an optional mappings file, over the defaults.
    pub fn load<P: AsRef<Path>>(settings: &[P], mappings: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for path in settings {
            let path = path.as_ref();
            tracing::debug!(path = %path.display(), "Loading settings file");
            config.apply(ConfigLayer::from_file(path)?);
        }
        if let Some(path) = mappings {
            tracing::debug!(path = %path.display(), "Loading tool mappings file");
            config.apply(ConfigLayer::from_file(path)?);
        }
        Ok(config)
    }

    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(rest) = layer.rest {
            if let Some(base_address) = rest.base_address {
                self.rest.base_address = base_address;
            }
            if let Some(headers) = rest.default_headers {
                self.rest.default_headers.extend(headers);
            }
            if let Some(headers) = rest.forwarded_headers {
                self.rest.forwarded_headers.extend(headers);
            }
            if rest.timeout_seconds.is_some() {
                self.rest.timeout_seconds = rest.timeout_seconds;
            }
        }
        if let Some(protocol_version) = layer.protocol_version {
            self.protocol_version = protocol_version;
        }
        if let Some(server_info) = layer.server_info {
            self.server_info = server_info;
        }
        if layer.instructions.is_some() {
            self.instructions = layer.instructions;
        }
        if let Some(tools) = layer.tools {
            self.merge_tools(tools);
        }
        if let Some(authorization) = layer.authorization {
            if let Some(require) = authorization.require_authorization {
                self.authorization.require_authorization = require;
            }
            if authorization.resource_metadata.is_some() {
                self.authorization.resource_metadata = authorization.resource_metadata;
            }
        }
    }

    /// Merge `incoming` into the tool list; incoming tools replace existing
    /// ones with the same name and come first.
    pub fn merge_tools(&mut self, incoming: Vec<ToolMapping>) {
        let mut merged = incoming;
        for existing in std::mem::take(&mut self.tools) {
            if !merged.iter().any(|tool| tool.name() == existing.name()) {
                merged.push(existing);
            }
        }
        self.tools = merged;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.rest.base_address).map_err(|e| {
            ConfigError::Invalid(format!(
                "rest.baseAddress '{}' must be an absolute http(s) URL: {e}",
                self.rest.base_address
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "rest.baseAddress '{}' must use http or https",
                self.rest.base_address
            )));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "protocolVersion must not be empty".to_string(),
            ));
        }
        for tool in &self.tools {
            if !is_method_token(&tool.rest.method) {
                return Err(ConfigError::Invalid(format!(
                    "tool '{}' has an invalid rest.method '{}'",
                    tool.name(),
                    tool.rest.method
                )));
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<ToolRegistry, ConfigError> {
        ToolRegistry::new(self.tools.clone())
    }
}

/// HTTP method names are RFC 9110 tokens.
fn is_method_token(method: &str) -> bool {
    !method.is_empty()
        && method
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn write_json(dir: &tempfile::TempDir, name: &str, value: serde_json::Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(value.to_string().as_bytes())
            .expect("write file");
        path
    }

    fn tool_json(name: &str, path: &str) -> serde_json::Value {
        json!({
            "mcp": {"name": name, "inputSchema": {"type": "object"}},
            "rest": {"method": "GET", "path": path}
        })
    }

    #[test]
    fn later_layers_override_scalars_and_merge_tools_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = write_json(
            &dir,
            "settings.json",
            json!({
                "rest": {
                    "baseAddress": "http://localhost:5000/",
                    "defaultHeaders": {"X-Api-Key": "k1"},
                    "forwardedHeaders": {"Authorization": true}
                },
                "serverInfo": {"name": "petstore", "version": "1.2.3"},
                "tools": [tool_json("get_pet", "/old"), tool_json("ping", "/ping")]
            }),
        );
        let mappings = write_json(
            &dir,
            "mappings.json",
            json!({
                "rest": {"baseAddress": "https://api.example.com/v2/", "defaultHeaders": {"X-Trace": "on"}},
                "tools": [tool_json("get_pet", "/pets/{id}")]
            }),
        );

        let config = GatewayConfig::load(&[settings], Some(mappings.as_path())).expect("config loads");

        assert_eq!(config.rest.base_address, "https://api.example.com/v2/");
        assert_eq!(config.rest.default_headers.len(), 2);
        assert_eq!(config.server_info.name, "petstore");
        assert_eq!(config.protocol_version, DEFAULT_PROTOCOL_VERSION);
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.tools[0].name(), "get_pet");
        assert_eq!(config.tools[0].rest.path, "/pets/{id}");
        assert_eq!(
            config.rest.forwarded_header_names().collect::<Vec<_>>(),
            vec!["Authorization"]
        );
        config.validate().expect("config is valid");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = GatewayConfig::load(&["/nonexistent/toolgate.json"], None)
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("/nonexistent/toolgate.json"));
    }

    #[test]
    fn relative_base_address_is_invalid() {
        let config = GatewayConfig {
            rest: RestSettings {
                base_address: "/api".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn method_must_be_a_token() {
        let mut config = GatewayConfig {
            rest: RestSettings {
                base_address: "http://localhost:8080".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.merge_tools(vec![
            serde_json::from_value(tool_json("broken", "/x")).expect("tool parses"),
        ]);
        config.tools[0].rest.method = "GE T".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.tools[0].rest.method = "PATCH".to_string();
        config.validate().expect("token method is valid");
    }

    #[test]
    fn metadata_defaults_bearer_methods_to_header() {
        let layer: ConfigLayer = serde_json::from_value(json!({
            "authorization": {
                "requireAuthorization": true,
                "resourceMetadata": {
                    "resource": "https://gateway.example.com/mcp",
                    "authorization_servers": ["https://auth.example.com"]
                }
            }
        }))
        .expect("layer parses");
        let mut config = GatewayConfig::default();
        config.apply(layer);
        let metadata = config
            .authorization
            .resource_metadata
            .expect("metadata present");
        assert!(config.authorization.require_authorization);
        assert_eq!(metadata.bearer_methods_supported, vec!["header".to_string()]);
    }
}
