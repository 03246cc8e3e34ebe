use std::sync::Arc;

use axum::{middleware, routing::post, Router};

pub mod books_client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use domain::registry::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(http::handlers::mcp_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::books_client::{BookRecord, BookSearch};
    use crate::domain::tools::build_registry;
    use crate::errors::UpstreamError;

    use super::*;

    struct MockBooks;

    #[async_trait::async_trait]
    impl BookSearch for MockBooks {
        async fn search(&self, query: &str) -> Result<Vec<BookRecord>, UpstreamError> {
            match query {
                "hobbit" => Ok(vec![BookRecord {
                    title: "The Hobbit".to_string(),
                    author: "J.R.R. Tolkien".to_string(),
                    first_publish_year: Some(1937_u64.into()),
                    edition_count: Some(120_u64.into()),
                }]),
                "offline" => Err(UpstreamError::Unavailable(
                    "connection refused".to_string(),
                )),
                _ => Ok(vec![]),
            }
        }
    }

    fn app() -> Router {
        let registry = build_registry(Arc::new(MockBooks)).expect("registry builds");
        build_app(AppState::new(registry))
    }

    fn mcp_request(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .uri("/mcp")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request build")
    }

    async fn body_json(response: Response) -> Value {
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&body).expect("valid json response")
    }

    #[tokio::test]
    async fn mcp_initialize_negotiates_protocol_version() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"test","version":"0.0.1"}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["jsonrpc"], "2.0");
        assert_eq!(body_json["id"], 1);
        assert_eq!(body_json["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(body_json["result"]["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(
            body_json["result"]["capabilities"]["tools"]["listChanged"],
            false
        );
    }

    #[tokio::test]
    async fn mcp_tools_list_describes_both_tools() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        let tools = body_json["result"]["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "add");
        assert_eq!(tools[0]["title"], "Addition Tool");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["a", "b"]));
        assert_eq!(tools[1]["name"], "search-books");
        assert_eq!(
            tools[1]["outputSchema"]["properties"]["docs"]["type"],
            "array"
        );
        assert_eq!(
            tools[1]["outputSchema"]["properties"]["docs"]["items"]["required"],
            json!(["title", "author"])
        );
    }

    #[tokio::test]
    async fn mcp_tools_call_add_returns_text_and_structured_content() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add","arguments":{"a":2,"b":40}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["id"], 3);
        assert_eq!(body_json["result"]["structuredContent"], json!({ "result": 42 }));
        assert_eq!(body_json["result"]["content"][0]["type"], "text");
        let text = body_json["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        let text_json: Value = serde_json::from_str(text).expect("text is json");
        assert_eq!(text_json, body_json["result"]["structuredContent"]);
    }

    #[tokio::test]
    async fn mcp_tools_call_search_books_maps_docs() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":"s-1","method":"tools/call","params":{"name":"search-books","arguments":{"query":"hobbit"}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["id"], "s-1");
        assert_eq!(
            body_json["result"]["structuredContent"]["docs"],
            json!([{
                "title": "The Hobbit",
                "author": "J.R.R. Tolkien",
                "first_publish_year": 1937,
                "edition_count": 120
            }])
        );
    }

    #[tokio::test]
    async fn mcp_tool_failures_stay_inside_a_200_response() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"search-books","arguments":{"query":"offline"}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["id"], 4);
        assert_eq!(body_json["error"]["code"], -32603);
        assert_eq!(body_json["error"]["data"]["code"], "upstream_unavailable");
        assert!(body_json["error"]["message"]
            .as_str()
            .expect("error message")
            .starts_with("search-books:"));
    }

    #[tokio::test]
    async fn mcp_unknown_tool_returns_invalid_params() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"subtract","arguments":{"a":1,"b":2}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["error"]["code"], -32602);
        assert_eq!(body_json["error"]["data"]["code"], "tool_not_found");
        assert_eq!(body_json["error"]["data"]["details"]["tool"], "subtract");
    }

    #[tokio::test]
    async fn mcp_invalid_arguments_return_invalid_params() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"add","arguments":{"a":1}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["error"]["code"], -32602);
        assert_eq!(body_json["error"]["data"]["code"], "invalid_arguments");
        assert_eq!(
            body_json["error"]["message"],
            "add: invalid arguments: missing field `b`"
        );
    }

    #[tokio::test]
    async fn mcp_unknown_method_returns_method_not_found() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","id":7,"method":"resources/list","params":{}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn mcp_parse_error_is_reported_in_body() {
        let response = app()
            .oneshot(mcp_request("{\"jsonrpc\":"))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn mcp_notification_returns_accepted() {
        let response = app()
            .oneshot(mcp_request(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn mcp_get_is_not_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn other_routes_are_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn concurrent_requests_receive_only_their_own_responses() {
        let app = app();
        let first = app.clone().oneshot(mcp_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":1}}}"#,
        ));
        let second = app.oneshot(mcp_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"search-books","arguments":{"query":"hobbit"}}}"#,
        ));

        let (first, second) = tokio::join!(first, second);
        let first = body_json(first.expect("first request")).await;
        let second = body_json(second.expect("second request")).await;

        assert_eq!(first["result"]["structuredContent"], json!({ "result": 2 }));
        assert!(first["result"]["structuredContent"].get("docs").is_none());
        assert_eq!(
            second["result"]["structuredContent"]["docs"][0]["title"],
            "The Hobbit"
        );
        assert!(second["result"]["structuredContent"].get("result").is_none());
    }
}
