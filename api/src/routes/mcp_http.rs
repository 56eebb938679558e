use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, HOST, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use toolgate_core::protocol::{Request as RpcRequest, Response as RpcResponse};
use toolgate_runtime::CallContext;

use crate::error::AppError;
use crate::state::AppState;

pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

pub fn router(route: &str) -> Router<AppState> {
    Router::new()
        .route(route, post(mcp_post).get(mcp_get))
        .route(PROTECTED_RESOURCE_PATH, get(protected_resource_metadata))
        .route(
            &format!("{PROTECTED_RESOURCE_PATH}{route}"),
            get(protected_resource_metadata),
        )
}

async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if state.config().authorization.require_authorization && !has_credentials(&headers) {
        tracing::warn!(route = %state.route, "Rejected request without Authorization header");
        return mcp_oauth_challenge(&request_base_url(&headers), &state.route);
    }

    let started = Instant::now();
    let request = match RpcRequest::parse(&body) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(bytes = body.len(), "Failed to parse request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(RpcResponse::from_error(None, error)),
            )
                .into_response();
        }
    };

    let method = request.method.clone();
    let response = state
        .dispatcher
        .dispatch(request, &CallContext::http(headers))
        .await;
    let status = status_for(&response);

    tracing::info!(
        method = %method,
        request_id = ?response.id,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP request completed"
    );

    if response.is_empty() {
        return status.into_response();
    }
    (status, Json(response)).into_response()
}

async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn protected_resource_metadata(State(state): State<AppState>) -> Response {
    match &state.config().authorization.resource_metadata {
        Some(metadata) => Json(metadata.clone()).into_response(),
        None => AppError::NotFound {
            message: "No protected resource metadata is configured".to_string(),
        }
        .into_response(),
    }
}

/// Notification ⇒ 204, protocol error ⇒ 400, anything else ⇒ 200.
fn status_for(response: &RpcResponse) -> StatusCode {
    if response.is_empty() {
        StatusCode::NO_CONTENT
    } else if response.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    }
}

fn has_credentials(headers: &HeaderMap) -> bool {
    header_value(headers, AUTHORIZATION.as_str())
        .is_some_and(|value| !value.trim().is_empty())
}

fn mcp_oauth_challenge(base_url: &str, route: &str) -> Response {
    let resource_metadata = format!("{base_url}{PROTECTED_RESOURCE_PATH}{route}");
    let challenge = format!("Bearer resource_metadata=\"{resource_metadata}\"");
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": "An Authorization header is required",
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(WWW_AUTHENTICATE, value);
    }
    response
}

/// Scheme and authority the client used to reach us, honouring reverse
/// proxy headers.
fn request_base_url(headers: &HeaderMap) -> String {
    let forwarded_proto = first_header_token(headers, "x-forwarded-proto");
    let forwarded_host = first_header_token(headers, "x-forwarded-host");
    let host = forwarded_host
        .or_else(|| header_value(headers, HOST.as_str()))
        .unwrap_or_else(|| "localhost".to_string());

    let proto = forwarded_proto.unwrap_or_else(|| {
        if host.contains("localhost") || host.starts_with("127.0.0.1") {
            "http".to_string()
        } else {
            "https".to_string()
        }
    });
    format!("{}://{}", proto.trim_end_matches(':'), host)
}

fn header_value(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

fn first_header_token(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::Value;
    use toolgate_core::config::GatewayConfig;
    use toolgate_runtime::Gateway;
    use tower::ServiceExt;

    use super::*;

    async fn spawn_rest_api() -> SocketAddr {
        let app = Router::new().route(
            "/api/whoami",
            get(|headers: HeaderMap| async move {
                Json(json!({ "tenant": header_value(&headers, "x-tenant") }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        addr
    }

    fn app_with(addr: SocketAddr, authorization: Value) -> Router {
        let config: GatewayConfig = serde_json::from_value(json!({
            "rest": {
                "baseAddress": format!("http://{addr}/api"),
                "forwardedHeaders": {"X-Tenant": true}
            },
            "tools": [
                {"mcp": {"name": "whoami"}, "rest": {"method": "GET", "path": "/whoami"}}
            ],
            "authorization": authorization
        }))
        .expect("config parses");
        let gateway = Gateway::from_config(config).expect("gateway builds");
        crate::app(AppState::new(gateway.dispatcher, "/mcp"))
    }

    fn offline_app(authorization: Value) -> Router {
        app_with("127.0.0.1:9".parse().expect("address"), authorization)
    }

    fn post_json() -> axum::http::request::Builder {
        Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header("content-type", "application/json")
            .header("host", "localhost:3000")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.oneshot(request).await.expect("request should succeed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, headers, body)
    }

    fn rpc(body: &'static str) -> Request<Body> {
        post_json()
            .body(Body::from(body))
            .expect("request should build")
    }

    #[tokio::test]
    async fn tools_list_returns_200_with_the_tool_table() {
        let (status, _, body) = send(
            offline_app(json!({})),
            rpc(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["id"], 7);
        assert_eq!(body["result"]["tools"][0]["name"], "whoami");
    }

    #[tokio::test]
    async fn notification_returns_204_without_body() {
        let (status, _, body) = send(
            offline_app(json!({})),
            rpc(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn bad_version_without_id_is_400_not_204() {
        let (status, _, body) = send(
            offline_app(json!({})),
            rpc(r#"{"jsonrpc":"1.0","method":"ping"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["error"]["code"], -32600);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn malformed_body_returns_400_parse_error() {
        let (status, _, body) = send(offline_app(json!({})), rpc("{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn unknown_method_returns_400_with_error_envelope() {
        let (status, _, body) = send(
            offline_app(json!({})),
            rpc(r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["id"], "x");
        assert_eq!(body["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn get_on_the_route_is_405() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/mcp")
            .body(Body::empty())
            .expect("request should build");
        let (status, _, _) = send(offline_app(json!({})), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn missing_credentials_get_a_challenge_when_required() {
        let app = offline_app(json!({"requireAuthorization": true}));
        let (status, headers, _) = send(
            app.clone(),
            rpc(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            headers
                .get(WWW_AUTHENTICATE)
                .expect("challenge header should exist"),
            "Bearer resource_metadata=\"http://localhost:3000/.well-known/oauth-protected-resource/mcp\""
        );

        let authorized = post_json()
            .header("authorization", "Bearer abc")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .expect("request should build");
        let (status, _, _) = send(app, authorized).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn blank_authorization_header_is_not_a_credential() {
        let request = post_json()
            .header("authorization", "   ")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "gateway.example.com, internal:3000")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .expect("request should build");
        let (status, headers, _) =
            send(offline_app(json!({"requireAuthorization": true})), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let challenge = headers
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .expect("challenge header should exist");
        assert!(challenge.contains("https://gateway.example.com/.well-known/oauth-protected-resource/mcp"));
    }

    #[tokio::test]
    async fn metadata_is_served_without_credentials_on_both_paths() {
        let authorization = json!({
            "requireAuthorization": true,
            "resourceMetadata": {
                "resource": "https://gateway.example.com/mcp",
                "authorization_servers": ["https://auth.example.com"]
            }
        });

        for uri in [
            "/.well-known/oauth-protected-resource",
            "/.well-known/oauth-protected-resource/mcp",
        ] {
            let request = Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request should build");
            let (status, _, body) = send(offline_app(authorization.clone()), request).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            let body: Value = serde_json::from_slice(&body).expect("json body");
            assert_eq!(body["resource"], "https://gateway.example.com/mcp");
            assert_eq!(body["bearer_methods_supported"], json!(["header"]));
        }
    }

    #[tokio::test]
    async fn metadata_is_404_when_not_configured() {
        let request = Request::builder()
            .uri("/.well-known/oauth-protected-resource/mcp")
            .body(Body::empty())
            .expect("request should build");
        let (status, _, body) = send(offline_app(json!({})), request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["error"], "not_found");
        assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn tool_call_forwards_configured_headers() {
        let addr = spawn_rest_api().await;
        let request = post_json()
            .header("x-tenant", "acme")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"whoami","arguments":{}}}"#,
            ))
            .expect("request should build");
        let (status, _, body) = send(app_with(addr, json!({})), request).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["result"]["isError"], false);
        assert_eq!(body["result"]["structuredContent"]["tenant"], "acme");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request should build");
        let (status, _, body) = send(offline_app(json!({})), request).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
