//! HTTP transport: the agent-protocol route, protected resource metadata and
//! a health probe, served with axum.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::Router;
use clap::Args;
use tokio_util::sync::CancellationToken;
use toolgate_runtime::Gateway;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use state::AppState;

#[derive(Args, Clone, Debug)]
pub struct HttpArgs {
    /// Address to listen on
    #[arg(long, env = "TOOLGATE_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,
    /// Path of the agent-protocol route
    #[arg(long, env = "TOOLGATE_ROUTE", default_value = "/mcp")]
    pub route: String,
}

pub fn app(state: AppState) -> Router {
    let route = state.route.clone();
    Router::new()
        .merge(routes::health::router())
        .merge(routes::mcp_http::router(&route))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(state)
}

/// Serve `gateway` over HTTP until `cancel` fires.
pub async fn serve(
    gateway: Gateway,
    http: &HttpArgs,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let state = AppState::new(gateway.dispatcher, &http.route);
    if state.config().authorization.require_authorization
        && state.config().authorization.resource_metadata.is_none()
    {
        tracing::warn!("Authorization is required but no protected resource metadata is configured");
    }
    tracing::info!(
        addr = %http.bind,
        route = %state.route,
        tools = state.dispatcher.registry().len(),
        "Toolgate HTTP listening"
    );

    let listener = tokio::net::TcpListener::bind(http.bind).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
