use std::sync::Arc;

use toolgate_core::config::GatewayConfig;
use toolgate_runtime::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Path of the agent-protocol route, always starting with `/`.
    pub route: Arc<str>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, route: &str) -> Self {
        Self {
            dispatcher,
            route: normalize_route(route).into(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        self.dispatcher.config()
    }
}

/// `mcp/` and `/mcp` both become `/mcp`; an empty route is `/`.
pub fn normalize_route(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    format!("/{trimmed}")
}
