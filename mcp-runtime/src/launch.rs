//! Shared startup plumbing for the binaries: configuration flags, the stdio
//! entry point and structured failure output.

use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use toolgate_core::config::GatewayConfig;

use crate::gateway::{Gateway, GatewayError, Overrides};
use crate::stdio::{ActivationGate, serve_stdio};

/// Where the gateway configuration comes from.
#[derive(Args, Clone, Debug, Default)]
pub struct GatewayArgs {
    /// Settings file(s), applied in order; later files win
    #[arg(long = "settings", env = "TOOLGATE_SETTINGS", value_delimiter = ',')]
    pub settings: Vec<PathBuf>,
    /// Tool mappings file, applied after all settings files
    #[arg(long, env = "TOOLGATE_MAPPINGS")]
    pub mappings: Option<PathBuf>,
    /// OpenAPI document(s) to convert at startup (file path or http(s) URL)
    #[arg(long = "openapi", env = "TOOLGATE_OPENAPI", value_delimiter = ',')]
    pub openapi: Vec<String>,
    /// Override rest.baseAddress
    #[arg(long, env = "TOOLGATE_REST_BASE_URL")]
    pub base_url: Option<String>,
    /// Require an Authorization header on the HTTP transport
    #[arg(long, env = "TOOLGATE_REQUIRE_AUTH")]
    pub require_auth: bool,
}

impl GatewayArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            require_auth: self.require_auth.then_some(true),
        }
    }

    pub fn load_config(&self) -> Result<GatewayConfig, GatewayError> {
        Ok(GatewayConfig::load(&self.settings, self.mappings.as_deref())?)
    }

    pub async fn bootstrap(&self) -> Result<Gateway, GatewayError> {
        let config = self.load_config()?;
        Gateway::bootstrap(config, &self.openapi, &self.overrides()).await
    }
}

/// Print a structured error to stderr and return the process exit code.
pub fn report_error(error: &str, message: &str) -> i32 {
    let body = json!({
        "error": error,
        "message": message,
    });
    let rendered = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    eprintln!("{rendered}");
    1
}

/// Cancel `cancel` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            cancel.cancel();
        }
    });
}

/// Boot the gateway from `args` and serve it over stdin/stdout.
pub async fn run_stdio(args: &GatewayArgs) -> i32 {
    let gateway = match args.bootstrap().await {
        Ok(gateway) => gateway,
        Err(err) => {
            tracing::error!(error = %err, "Gateway startup failed");
            return report_error(err.code(), &err.to_string());
        }
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let gate = ActivationGate::new();
    gate.activate();

    match serve_stdio(&gateway.dispatcher, &gate, cancel).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "Stream transport failed");
            report_error("transport_error", &err.to_string())
        }
    }
}
