use axum::http::header::WWW_AUTHENTICATE;
use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS: any origin, method and header. `WWW-Authenticate` is
/// exposed so browser hosts can read the 401 challenge.
pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([WWW_AUTHENTICATE])
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    #[tokio::test]
    async fn preflight_from_any_origin_is_allowed() {
        let app = Router::new()
            .route("/mcp", post(ok))
            .layer(super::build_cors_layer());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/mcp")
                    .header("origin", "https://agent.example.com")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "authorization,content-type")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .expect("allow-origin header should exist"),
            "*"
        );
    }
}
