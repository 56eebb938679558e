use clap::{Args, ValueEnum};
use tokio_util::sync::CancellationToken;
use toolgate_api::HttpArgs;
use toolgate_runtime::GatewayArgs;
use toolgate_runtime::launch::{cancel_on_ctrl_c, run_stdio};

use crate::util::{LogFormat, exit_error, init_logging};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One JSON message per line on stdin/stdout
    Stdio,
    /// POST endpoint served by the built-in HTTP server
    Http,
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Transport to serve
    #[arg(long, value_enum, env = "TOOLGATE_MODE", default_value = "stdio")]
    pub mode: Mode,

    #[command(flatten)]
    pub gateway: GatewayArgs,

    #[command(flatten)]
    pub http: HttpArgs,
}

impl ServeArgs {
    pub fn log_format(&self) -> LogFormat {
        match self.mode {
            Mode::Stdio => LogFormat::Stderr,
            Mode::Http => LogFormat::Json,
        }
    }
}

pub async fn run(args: ServeArgs) -> i32 {
    init_logging(args.log_format());

    match args.mode {
        Mode::Stdio => run_stdio(&args.gateway).await,
        Mode::Http => {
            let gateway = match args.gateway.bootstrap().await {
                Ok(gateway) => gateway,
                Err(err) => {
                    tracing::error!(error = %err, "Gateway startup failed");
                    return exit_error(err.code(), &err.to_string(), None);
                }
            };
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            match toolgate_api::serve(gateway, &args.http, cancel).await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(error = %err, "HTTP server failed");
                    exit_error("server_error", &err.to_string(), None)
                }
            }
        }
    }
}
