//! In-process tests of the HTTP routes, driven through `tower::ServiceExt`
//! without binding a listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use skillbridge_mcp::config::{default_config, Environment, ServerConfig};
use skillbridge_mcp::mcp::server::McpServer;
use skillbridge_mcp::mcp::transport::http::{build_router, SseHub};
use skillbridge_mcp::skills::{require_str, InMemoryRegistry, SkillMetadata};

fn demo_registry() -> InMemoryRegistry {
    let mut registry = InMemoryRegistry::new();
    registry.register(
        "echo",
        SkillMetadata::new("Echoes the given text")
            .with_param("text", "str", "Text to echo")
            .with_required(&["text"]),
        |args| Ok(json!(require_str(args, "text")?)),
    );
    registry
}

fn make_router<F>(mutate: F) -> (Arc<McpServer>, Router)
where
    F: FnOnce(&mut ServerConfig),
{
    let mut config = default_config(Environment::Development);
    mutate(&mut config);
    let server = Arc::new(McpServer::new(config, Arc::new(demo_registry())));
    let router = build_router(Arc::clone(&server), Arc::new(SseHub::new()));
    (server, router)
}

fn post_body(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn post_request_returns_json_response() {
    let (_, router) = make_router(|_| {});
    let response = router
        .oneshot(post_body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["id"], json!(1));
    assert_eq!(body["result"], json!({}));
}

#[tokio::test]
async fn post_notification_returns_202_without_body() {
    let (_, router) = make_router(|_| {});
    let response = router
        .oneshot(post_body(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn post_malformed_json_returns_parse_error_body() {
    let (_, router) = make_router(|_| {});
    let response = router.oneshot(post_body("{oops")).await.unwrap();

    // Protocol errors ride a normal HTTP 200; the failure lives in the body.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!(-32700));
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn post_tool_call_round_trip() {
    let (_, router) = make_router(|_| {});
    let response = router
        .oneshot(post_body(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"echo","arguments":{"text":"over http"}}}"#,
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["result"]["content"][0]["text"], json!("over http"));
    assert_eq!(body["result"]["isError"], json!(false));
}

#[tokio::test]
async fn sse_requires_event_stream_accept_header() {
    let (_, router) = make_router(|_| {});
    let request = Request::builder()
        .method("GET")
        .uri("/mcp")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn sse_opens_stream_with_connected_event() {
    let (_, router) = make_router(|_| {});
    let request = Request::builder()
        .method("GET")
        .uri("/mcp")
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    // The stream never ends; read only the first frame.
    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let data = frame.into_data().ok().expect("first frame carries data");
    let text = String::from_utf8(data.to_vec()).unwrap();
    assert!(text.contains("event: connected"));
    assert!(text.contains("connectionId"));
    assert!(text.contains("sse_"));
}

#[tokio::test]
async fn delete_unknown_session_is_404() {
    let (_, router) = make_router(|_| {});
    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", "session_404")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_without_header_is_404() {
    let (_, router) = make_router(|_| {});
    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_known_session_is_204() {
    let (server, router) = make_router(|_| {});

    let response = router
        .clone()
        .oneshot(post_body(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.session_count(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", "session_1")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
async fn auth_rejects_missing_key() {
    let (_, router) = make_router(|config| {
        config.http.auth.enabled = true;
        config.http.auth.api_keys = vec!["sekrit".to_string()];
    });

    let response = router
        .oneshot(post_body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!(-32000));
}

#[tokio::test]
async fn auth_accepts_api_key_header() {
    let (_, router) = make_router(|config| {
        config.http.auth.enabled = true;
        config.http.auth.api_keys = vec!["sekrit".to_string()];
    });

    let mut request = post_body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    request
        .headers_mut()
        .insert("x-api-key", "sekrit".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_accepts_bearer_token() {
    let (_, router) = make_router(|config| {
        config.http.auth.enabled = true;
        config.http.auth.api_keys = vec!["sekrit".to_string()];
    });

    let mut request = post_body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer sekrit".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_rejects_wrong_key() {
    let (_, router) = make_router(|config| {
        config.http.auth.enabled = true;
        config.http.auth.api_keys = vec!["sekrit".to_string()];
    });

    let mut request = post_body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    request
        .headers_mut()
        .insert("x-api-key", "wrong".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let (_, router) = make_router(|_| {});
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/mcp")
        .header(header::ORIGIN, "https://client.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}
