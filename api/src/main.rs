use clap::Parser;
use tokio_util::sync::CancellationToken;
use toolgate_api::HttpArgs;
use toolgate_runtime::launch::cancel_on_ctrl_c;
use toolgate_runtime::{GatewayArgs, report_error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "toolgate-http",
    version,
    about = "Toolgate HTTP server: exposes a REST API as agent-protocol tools"
)]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,

    #[command(flatten)]
    http: HttpArgs,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let code = run(&cli).await;
    std::process::exit(code);
}

async fn run(cli: &Cli) -> i32 {
    let gateway = match cli.gateway.bootstrap().await {
        Ok(gateway) => gateway,
        Err(err) => {
            tracing::error!(error = %err, "Gateway startup failed");
            return report_error(err.code(), &err.to_string());
        }
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    match toolgate_api::serve(gateway, &cli.http, cancel).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "HTTP server failed");
            report_error("server_error", &err.to_string())
        }
    }
}
