use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output shape. Stdio serving owns stdout, so its logs go to stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Stderr,
}

pub fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Stderr => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .init(),
    }
}

pub fn print_json(value: &serde_json::Value) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    println!("{rendered}");
}

pub fn error_body(error: &str, message: &str, docs_hint: Option<&str>) -> serde_json::Value {
    let mut err = json!({
        "error": error,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    err
}

pub fn exit_error(error: &str, message: &str, docs_hint: Option<&str>) -> i32 {
    let err = error_body(error, message, docs_hint);
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_hint_only_when_given() {
        let plain = error_body("convert_error", "boom", None);
        assert_eq!(plain, json!({"error": "convert_error", "message": "boom"}));

        let hinted = error_body("convert_error", "boom", Some("check the path"));
        assert_eq!(hinted["docs_hint"], "check the path");
    }
}
