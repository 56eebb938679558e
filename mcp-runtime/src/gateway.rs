//! Startup wiring: configuration plus overrides plus OpenAPI sources in, a
//! validated configuration and a ready dispatcher out.

use std::sync::Arc;

use thiserror::Error;
use toolgate_core::config::GatewayConfig;
use toolgate_core::error::ConfigError;

use crate::dispatcher::Dispatcher;
use crate::rest::{EngineError, RestEngine};
use crate::sources::{self, SourceError, SourceLocation};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl GatewayError {
    /// Stable machine-readable code for structured error output.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config_error",
            GatewayError::Source(_) => "openapi_source_error",
            GatewayError::Engine(_) => "rest_client_error",
        }
    }
}

/// Command-line values that take precedence over configuration files.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub require_auth: Option<bool>,
}

impl Overrides {
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(base_url) = &self.base_url {
            config.rest.base_address = base_url.clone();
        }
        if let Some(require_auth) = self.require_auth {
            config.authorization.require_authorization = require_auth;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gateway {
    pub config: Arc<GatewayConfig>,
    pub dispatcher: Dispatcher,
}

impl Gateway {
    pub async fn bootstrap(
        mut config: GatewayConfig,
        openapi_sources: &[String],
        overrides: &Overrides,
    ) -> Result<Self, GatewayError> {
        overrides.apply(&mut config);

        if !openapi_sources.is_empty() {
            let client = reqwest::Client::new();
            for raw in openapi_sources {
                let loaded = sources::load(SourceLocation::parse(raw), &client).await?;
                if config.rest.base_address.trim().is_empty() {
                    if let Some(base_address) = loaded.base_address() {
                        tracing::info!(base_address = %base_address, "Using base address from OpenAPI document");
                        config.rest.base_address = base_address;
                    }
                }
                config.merge_tools(loaded.conversion.tools);
            }
        }

        config.validate()?;
        Self::from_config(config)
    }

    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let registry = config.registry()?;
        let engine = RestEngine::new(&config.rest)?;
        for tool in registry.iter() {
            tracing::debug!(
                tool = %tool.name(),
                method = %tool.rest.method,
                path = %tool.rest.path,
                "Registered tool"
            );
        }
        tracing::info!(
            tools = registry.len(),
            base_address = %config.rest.base_address,
            "Gateway configured"
        );
        let config = Arc::new(config);
        let dispatcher = Dispatcher::new(config.clone(), Arc::new(registry), engine);
        Ok(Self { config, dispatcher })
    }
}
