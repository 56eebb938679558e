use std::path::{Path, PathBuf};

use clap::Args;
use serde_json::json;
use toolgate_runtime::sources::{self, LoadedSource, SourceLocation};

use crate::util::print_json;

#[derive(Args, Clone, Debug)]
pub struct ConvertArgs {
    /// OpenAPI or Swagger document: file path or http(s) URL
    pub source: String,
    /// Where to write the tool mappings
    #[arg(long, short, default_value = "mappings.json")]
    pub output: PathBuf,
}

pub async fn run(args: ConvertArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let loaded = sources::load(SourceLocation::parse(&args.source), &client).await?;
    let warnings = loaded.conversion.warnings.clone();
    let count = write_mappings(loaded, &args.output)?;

    tracing::info!(
        output = %args.output.display(),
        tools = count,
        "Wrote tool mappings"
    );
    print_json(&json!({
        "output": args.output.display().to_string(),
        "tools": count,
        "warnings": warnings,
    }));
    Ok(())
}

/// Write the conversion as a mappings layer, with the base address resolved
/// against the source location. Returns the number of tools written.
pub fn write_mappings(
    mut loaded: LoadedSource,
    output: &Path,
) -> Result<usize, Box<dyn std::error::Error>> {
    loaded.conversion.base_address = loaded.base_address();
    let mut rendered = loaded.conversion.to_json_pretty()?;
    rendered.push('\n');
    std::fs::write(output, rendered)?;
    Ok(loaded.conversion.tools.len())
}
