pub mod config;
pub mod error;
pub mod mcp;
pub mod openapi;
pub mod protocol;
pub mod tools;
pub mod validate;
