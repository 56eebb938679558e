use serde_json::{Value, json};
use toolgate_core::tools::ToolRegistry;
use toolgate_runtime::GatewayArgs;

use crate::util::print_json;

/// Resolve the configuration exactly as `serve` would and print the tool table.
pub async fn run(args: GatewayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = args.bootstrap().await?;
    print_json(&json!({
        "base_address": gateway.config.rest.base_address,
        "tools": tool_table(gateway.dispatcher.registry()),
    }));
    Ok(())
}

pub fn tool_table(registry: &ToolRegistry) -> Vec<Value> {
    registry
        .iter()
        .map(|tool| {
            let mut row = json!({
                "name": tool.name(),
                "method": tool.rest.method,
                "path": tool.rest.path,
                "required": tool.mcp.input_schema.required,
            });
            if let Some(query) = &tool.rest.query {
                row["query"] = json!(query);
            }
            if let Some(description) = &tool.mcp.description {
                row["description"] = json!(description);
            }
            row
        })
        .collect()
}
