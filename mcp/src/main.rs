use clap::Parser;
use toolgate_runtime::{GatewayArgs, run_stdio};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "toolgate-mcp",
    version,
    about = "Toolgate stdio server for agent hosts that launch a binary directly"
)]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries protocol traffic only
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info")))
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();

    let code = run_stdio(&cli.gateway).await;
    std::process::exit(code);
}
