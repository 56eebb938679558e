use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolgate_core::config::RestSettings;
use toolgate_core::tools::ToolMapping;
use url::Url;

use crate::template::render_call;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid REST base address '{address}': {source}")]
    BaseAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid default header '{0}'")]
    Header(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Classified result of one REST call. Transport failures are folded in as
/// status 500 with a descriptive body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestOutcome {
    pub success: bool,
    pub status: u16,
    pub body: String,
}

impl RestOutcome {
    fn failure(body: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 500,
            body: body.into(),
        }
    }
}

/// Performs exactly one outbound HTTP call per tool invocation.
#[derive(Debug, Clone)]
pub struct RestEngine {
    http: reqwest::Client,
    base: Url,
}

impl RestEngine {
    pub fn new(settings: &RestSettings) -> Result<Self, EngineError> {
        let mut address = settings.base_address.trim().to_string();
        if !address.ends_with('/') {
            address.push('/');
        }
        let base = Url::parse(&address).map_err(|source| EngineError::BaseAddress {
            address: settings.base_address.clone(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| EngineError::Header(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| EngineError::Header(name.to_string()))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(seconds) = settings.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }

        Ok(Self {
            http: builder.build()?,
            base,
        })
    }

    /// Render `tool`'s REST template against `arguments` and perform the call.
    /// Never fails: every transport problem becomes an unsuccessful outcome.
    pub async fn execute(
        &self,
        tool: &ToolMapping,
        arguments: &Map<String, Value>,
        forwarded_headers: HeaderMap,
        cancel: &CancellationToken,
    ) -> RestOutcome {
        let rendered = render_call(&tool.rest, arguments);

        let method = match Method::from_bytes(rendered.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                tracing::error!(tool = %tool.name(), method = %rendered.method, "Invalid HTTP method");
                return RestOutcome::failure(format!("HTTP request failed: invalid method: {e}"));
            }
        };
        // `./` keeps a first segment such as `v1:batch` from parsing as a scheme.
        let url = match self.base.join(&format!("./{}", rendered.target)) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(tool = %tool.name(), target = %rendered.target, error = %e, "Invalid REST target");
                return RestOutcome::failure(format!("HTTP request failed: invalid URL: {e}"));
            }
        };

        tracing::info!(tool = %tool.name(), method = %method, url = %url, "Executing REST call");

        let mut request = self.http.request(method, url).headers(forwarded_headers);
        if let Some(body) = rendered.body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let call = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(tool = %tool.name(), "REST call cancelled");
                RestOutcome::failure("HTTP request cancelled")
            }
            result = call => match result {
                Ok((status, body)) => {
                    tracing::info!(tool = %tool.name(), status = status.as_u16(), "REST call completed");
                    RestOutcome {
                        success: status.is_success(),
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => {
                    tracing::error!(tool = %tool.name(), error = %e, "REST call failed");
                    RestOutcome::failure(format!("HTTP request failed: {e}"))
                }
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path, RawQuery};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::{any, get};
    use serde_json::json;
    use toolgate_core::tools::{InputSchema, RestTemplate, ToolDefinition};

    use super::*;

    /// Downstream REST API used by runtime tests.
    pub(crate) async fn spawn_rest_api() -> SocketAddr {
        async fn echo(
            method: axum::http::Method,
            Path(rest): Path<String>,
            RawQuery(query): RawQuery,
            headers: AxumHeaders,
            body: Bytes,
        ) -> axum::Json<Value> {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            };
            axum::Json(json!({
                "method": method.as_str(),
                "path": rest,
                "query": query,
                "apiKey": header("x-api-key"),
                "tenant": header("x-tenant"),
                "contentType": header("content-type"),
                "body": String::from_utf8_lossy(&body),
            }))
        }

        let app = Router::new()
            .route("/api/echo/{*rest}", any(echo))
            .route("/api/list", get(|| async { axum::Json(json!([{"id": 1}, {"id": 2}])) }))
            .route("/api/text", get(|| async { "plain text" }))
            .route("/api/number", get(|| async { "42" }))
            .route(
                "/api/missing",
                get(|| async { (StatusCode::NOT_FOUND, "no such thing") }),
            )
            .route(
                "/api/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test api");
        });
        addr
    }

    pub(crate) fn settings(addr: SocketAddr) -> RestSettings {
        RestSettings {
            base_address: format!("http://{addr}/api"),
            default_headers: BTreeMap::from([("X-Api-Key".to_string(), "secret".to_string())]),
            ..Default::default()
        }
    }

    pub(crate) fn tool(method: &str, path: &str, query: Option<&str>, body: Option<&str>) -> ToolMapping {
        ToolMapping {
            mcp: ToolDefinition {
                name: "test_tool".to_string(),
                title: None,
                description: None,
                input_schema: InputSchema::default(),
            },
            rest: RestTemplate {
                method: method.to_string(),
                path: path.to_string(),
                query: query.map(str::to_string),
                body: body.map(str::to_string),
            },
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("arguments must be an object")
    }

    #[tokio::test]
    async fn rendered_call_reaches_downstream_api() {
        let addr = spawn_rest_api().await;
        let engine = RestEngine::new(&settings(addr)).expect("engine builds");
        let mut forwarded = HeaderMap::new();
        forwarded.insert("x-tenant", HeaderValue::from_static("acme"));

        let outcome = engine
            .execute(
                &tool("POST", "/echo/{name}", Some("q={q}"), Some(r#"{"n": {n}}"#)),
                &args(json!({"name": "a b", "q": "x", "n": 5})),
                forwarded,
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status, 200);
        let echoed: Value = serde_json::from_str(&outcome.body).expect("json body");
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "a b");
        assert_eq!(echoed["query"], "q=x");
        assert_eq!(echoed["apiKey"], "secret");
        assert_eq!(echoed["tenant"], "acme");
        assert_eq!(echoed["contentType"], "application/json");
        assert_eq!(echoed["body"], r#"{"n": 5}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_not_raised() {
        let addr = spawn_rest_api().await;
        let engine = RestEngine::new(&settings(addr)).expect("engine builds");

        let outcome = engine
            .execute(
                &tool("GET", "/missing", None, None),
                &Map::new(),
                HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            outcome,
            RestOutcome {
                success: false,
                status: 404,
                body: "no such thing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn connection_failure_becomes_status_500() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("address");
        drop(listener);
        let engine = RestEngine::new(&settings(addr)).expect("engine builds");

        let outcome = engine
            .execute(
                &tool("GET", "/anything", None, None),
                &Map::new(),
                HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status, 500);
        assert!(outcome.body.starts_with("HTTP request failed: "));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_call() {
        let addr = spawn_rest_api().await;
        let engine = RestEngine::new(&settings(addr)).expect("engine builds");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = engine
            .execute(&tool("GET", "/slow", None, None), &Map::new(), HeaderMap::new(), &cancel)
            .await;

        assert_eq!(outcome.status, 500);
        assert_eq!(outcome.body, "HTTP request cancelled");
    }

    #[test]
    fn invalid_base_address_is_rejected() {
        let err = RestEngine::new(&RestSettings {
            base_address: "not a url".to_string(),
            ..Default::default()
        })
        .expect_err("must fail");
        assert!(matches!(err, EngineError::BaseAddress { .. }));
    }
}
