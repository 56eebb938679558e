//! Runtime half of the gateway: everything between a decoded protocol
//! request and the downstream REST API.

pub mod dispatcher;
pub mod gateway;
pub mod launch;
pub mod rest;
pub mod sources;
pub mod stdio;
pub mod template;

pub use dispatcher::{CallContext, Dispatcher, Handler};
pub use gateway::{Gateway, GatewayError, Overrides};
pub use launch::{GatewayArgs, report_error, run_stdio};
pub use rest::{RestEngine, RestOutcome};
pub use stdio::{ActivationGate, serve_stdio, serve_stream};
