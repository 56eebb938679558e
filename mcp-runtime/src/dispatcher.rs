//! Method routing for the agent protocol.
//!
//! Every decoded request goes through [`Dispatcher::dispatch`], which is the
//! single place where handler failures are turned into protocol errors.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolgate_core::config::GatewayConfig;
use toolgate_core::error::{ParamsError, codes};
use toolgate_core::mcp::{
    Content, InitializeParams, InitializeResult, ServerCapabilities, ToolCallResult,
    ToolsCallParams, ToolsListParams, ToolsListResult,
};
use toolgate_core::protocol::{ProtocolError, Request, Response};
use toolgate_core::tools::ToolRegistry;
use toolgate_core::validate::validate_arguments;

use crate::rest::{RestEngine, RestOutcome};

/// The fixed method table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Ping,
    Initialize,
    Initialized,
    ToolsList,
    ToolsCall,
}

impl Handler {
    /// Method names match case-insensitively.
    pub fn for_method(method: &str) -> Option<Self> {
        match method.to_ascii_lowercase().as_str() {
            "ping" => Some(Self::Ping),
            "initialize" => Some(Self::Initialize),
            "notifications/initialized" => Some(Self::Initialized),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            _ => None,
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidParams(#[from] ParamsError),
    #[error("{0}")]
    Internal(String),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

/// Per-call context supplied by the transport.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Inbound HTTP headers. `None` on the stream transport.
    pub headers: Option<HeaderMap>,
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn stream(cancel: CancellationToken) -> Self {
        Self {
            headers: None,
            cancel,
        }
    }

    pub fn http(headers: HeaderMap) -> Self {
        Self {
            headers: Some(headers),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<GatewayConfig>,
    registry: Arc<ToolRegistry>,
    engine: RestEngine,
}

impl Dispatcher {
    pub fn new(config: Arc<GatewayConfig>, registry: Arc<ToolRegistry>, engine: RestEngine) -> Self {
        Self {
            config,
            registry,
            engine,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Protocol errors are always returned, even for a request without `id`.
    /// Only successful handler output is withheld from notifications.
    pub async fn dispatch(&self, request: Request, context: &CallContext) -> Response {
        let response = self.route(&request, context).await;
        if request.is_notification() && response.error.is_none() {
            Response::empty()
        } else {
            response
        }
    }

    async fn route(&self, request: &Request, context: &CallContext) -> Response {
        let id = request.id.clone();

        if !request.is_valid_version() {
            tracing::warn!(
                method = %request.method,
                version = %request.version,
                "Invalid protocol version received"
            );
            return Response::from_error(id, ProtocolError::invalid_request());
        }

        let Some(handler) = Handler::for_method(&request.method) else {
            tracing::warn!(method = %request.method, request_id = ?id, "Unknown method");
            return Response::from_error(id, ProtocolError::method_not_found(&request.method));
        };

        tracing::debug!(method = handler.method(), request_id = ?id, "Dispatching request");

        match self.invoke(handler, request, context).await {
            Ok(response) => response,
            Err(HandlerError::InvalidParams(e)) => {
                tracing::warn!(method = handler.method(), request_id = ?id, error = %e, "Invalid params");
                Response::from_error(id, ProtocolError::invalid_params(e.to_string()))
            }
            Err(HandlerError::Internal(message)) => {
                tracing::error!(method = handler.method(), request_id = ?id, error = %message, "Handler failed");
                Response::from_error(id, ProtocolError::internal(message))
            }
        }
    }

    async fn invoke(
        &self,
        handler: Handler,
        request: &Request,
        context: &CallContext,
    ) -> Result<Response, HandlerError> {
        let id = request.id.clone();
        match handler {
            Handler::Ping => Ok(Response::success(id, json!({}))),
            Handler::Initialize => {
                let _: Option<InitializeParams> = request.params()?;
                let result = InitializeResult {
                    protocol_version: self.config.protocol_version.clone(),
                    capabilities: ServerCapabilities::tools_only(false),
                    server_info: self.config.server_info.clone(),
                    instructions: self.config.instructions.clone(),
                };
                Ok(Response::success(id, to_value(&result)?))
            }
            Handler::Initialized => {
                tracing::info!("Client finished initialization");
                Ok(Response::empty())
            }
            Handler::ToolsList => {
                let _: Option<ToolsListParams> = request.params()?;
                let result = ToolsListResult {
                    tools: self.registry.definitions(),
                };
                Ok(Response::success(id, to_value(&result)?))
            }
            Handler::ToolsCall => {
                let params: ToolsCallParams = request.required_params()?;
                Ok(self.call_tool(id, params, context).await)
            }
        }
    }

    async fn call_tool(
        &self,
        id: Option<Value>,
        params: ToolsCallParams,
        context: &CallContext,
    ) -> Response {
        let Some(tool) = self.registry.find_by_name(&params.name) else {
            tracing::warn!(tool = %params.name, request_id = ?id, "Tool not found");
            return Response::error(
                id,
                codes::TOOL_NOT_FOUND,
                format!("Tool '{}' not found", params.name),
                None,
            );
        };

        let arguments = params.arguments.unwrap_or_default();
        if let Err(e) = validate_arguments(&tool.mcp, &arguments) {
            tracing::warn!(tool = %params.name, request_id = ?id, error = %e, "Invalid arguments");
            return Response::error(id, codes::INVALID_ARGUMENTS, e.to_string(), None);
        }

        let headers = self.forwarded_headers(context);
        let outcome = self
            .engine
            .execute(tool, &arguments, headers, &context.cancel)
            .await;
        if !outcome.success {
            tracing::warn!(
                tool = %params.name,
                request_id = ?id,
                status = outcome.status,
                "REST API returned an error"
            );
        }
        Response::success(id, tool_call_result(outcome))
    }

    /// First non-empty inbound value of every enabled forwarded header.
    fn forwarded_headers(&self, context: &CallContext) -> HeaderMap {
        let mut forwarded = HeaderMap::new();
        let names: Vec<&str> = self.config.rest.forwarded_header_names().collect();
        if names.is_empty() {
            return forwarded;
        }
        let Some(inbound) = &context.headers else {
            tracing::debug!(count = names.len(), "Header forwarding is configured but the call has no HTTP context");
            return forwarded;
        };
        for name in names {
            let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::warn!(header = name, "Ignoring invalid forwarded header name");
                continue;
            };
            if let Some(value) = inbound
                .get_all(&header)
                .iter()
                .find(|value| !value.as_bytes().is_empty())
            {
                forwarded.insert(header, value.clone());
            }
        }
        forwarded
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, HandlerError> {
    Ok(serde_json::to_value(value)?)
}

fn tool_call_result(outcome: RestOutcome) -> ToolCallResult {
    if !outcome.success {
        return ToolCallResult {
            content: vec![Content::text(format!(
                "REST API returned error code {}: '{}'",
                outcome.status, outcome.body
            ))],
            structured_content: None,
            is_error: true,
        };
    }
    ToolCallResult {
        structured_content: structured_content(&outcome.body),
        content: vec![Content::text(outcome.body)],
        is_error: false,
    }
}

/// Structured content must be an object: arrays are wrapped, scalars and
/// non-JSON bodies produce none.
fn structured_content(body: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Object(object) => Some(Value::Object(object)),
        Value::Array(items) => {
            let mut wrapped = Map::new();
            wrapped.insert("results".to_string(), Value::Array(items));
            Some(Value::Object(wrapped))
        }
        _ => None,
    }
}
