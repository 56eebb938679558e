use std::path::PathBuf;

use thiserror::Error;

/// Error codes carried in the `error.code` field of a protocol response.
///
/// The negative codes are the fixed JSON-RPC set. The positive codes are
/// application-level and mirror the HTTP status a REST client would expect.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const INVALID_ARGUMENTS: i64 = 400;
    pub const TOOL_NOT_FOUND: i64 = 404;
}

/// Failure to turn a request's `params` into the shape a handler expects.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Params are required.")]
    Missing,
    #[error("Failed to deserialize params: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Startup configuration failures. Any of these aborts the process before a
/// transport is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration file '{path}' is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Duplicate tool name '{0}' in tool mappings")]
    DuplicateTool(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Hard failures of the OpenAPI conversion. A document that raises one of
/// these produces no tools at all.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to read or parse OpenAPI document: {0}")]
    Parse(String),
    #[error("Failed to parse OpenAPI document: {}", .0.join("; "))]
    Structure(Vec<String>),
}
