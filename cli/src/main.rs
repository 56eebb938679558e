mod commands;
mod util;

use clap::{Parser, Subcommand};
use toolgate_runtime::GatewayArgs;

use commands::convert::ConvertArgs;
use commands::serve::ServeArgs;
use util::{LogFormat, exit_error, init_logging};

#[derive(Parser)]
#[command(
    name = "toolgate",
    version,
    about = "Toolgate: expose an existing REST API as agent-protocol tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the gateway over stdio or HTTP
    Serve(ServeArgs),
    /// Convert an OpenAPI/Swagger document into a tool mappings file
    Convert(ConvertArgs),
    /// Print the resolved tool table
    Tools(GatewayArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Convert(args) => {
            init_logging(LogFormat::Stderr);
            match commands::convert::run(args).await {
                Ok(()) => 0,
                Err(e) => exit_error(
                    "convert_error",
                    &e.to_string(),
                    Some("The source must be an OpenAPI 3.x or Swagger 2.0 document (JSON or YAML)"),
                ),
            }
        }
        Commands::Tools(args) => {
            init_logging(LogFormat::Stderr);
            match commands::tools::run(args).await {
                Ok(()) => 0,
                Err(e) => exit_error("config_error", &e.to_string(), None),
            }
        }
    };
    std::process::exit(code);
}
