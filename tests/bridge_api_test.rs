use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use iris::adapters::{AppState, FileBindingStore, FileLogStore, RequireApiKey};
use iris::bridge::BridgeEngine;
use iris::domain::{AuthType, Binding, BindingStore, LogSink, TargetProtocol};

fn binding(id: &str, protocol: TargetProtocol, url: &str) -> Binding {
    Binding {
        id: id.into(),
        name: format!("binding {id}"),
        enabled: true,
        target_protocol: protocol,
        target_url: url.into(),
        model: None,
        auth_type: AuthType::None,
        auth_key: None,
        custom_headers: None,
        request_template: None,
        response_template: None,
        finish_match_value: None,
    }
}

async fn app_with(
    bindings: Vec<Binding>,
    api_key: Option<&str>,
) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileBindingStore::load(&dir.path().join("bindings.json"))
        .await
        .unwrap();
    for b in bindings {
        store.save_binding(b).await.unwrap();
    }
    let bindings: Arc<dyn BindingStore> = Arc::new(store);
    let logs: Arc<dyn LogSink> = Arc::new(
        FileLogStore::load(&dir.path().join("logs.json"))
            .await
            .unwrap(),
    );
    let engine = Arc::new(BridgeEngine::new(bindings.clone(), logs.clone()));
    let state = AppState {
        engine,
        bindings,
        logs,
    };
    let auth = RequireApiKey {
        api_key: api_key.map(String::from),
    };
    (iris::create_app(state, auth), dir)
}

fn canonical_request() -> Value {
    json!({
        "message_id": "m1",
        "agent_id": "a1",
        "message": [{ "role": "user", "type": "text", "text": "hello" }]
    })
}

fn bridge_post(agent_id: &str, body: String) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/bridge/{agent_id}"))
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn sse_data_events(response: axum::response::Response) -> Vec<Value> {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn malformed_json_is_rejected_before_streaming() {
    let (app, _dir) = app_with(vec![], None).await;
    let response = app
        .oneshot(bridge_post("a1", "{not json".into()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "Invalid JSON");
}

#[tokio::test]
async fn unknown_agent_streams_exactly_one_error_fragment() {
    let (app, _dir) = app_with(vec![], None).await;
    let response = app
        .oneshot(bridge_post("ghost", canonical_request().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sse_data_events(response).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(events[0]["answer"], "Agent not found or disabled");
    assert_eq!(events[0]["is_finish"], true);
}

#[tokio::test]
async fn bridge_routes_require_the_configured_api_key() {
    let (app, _dir) = app_with(vec![], Some("secret")).await;

    let response = app
        .clone()
        .oneshot(bridge_post("a1", canonical_request().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = bridge_post("a1", canonical_request().to_string());
    request
        .headers_mut()
        .insert("Authorization", "Bearer secret".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Management routes stay open.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/bindings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bindings_crud_round_trip() {
    let (app, _dir) = app_with(vec![], None).await;

    let create = Request::builder()
        .uri("/api/bindings")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_string(&binding(
                "b1",
                TargetProtocol::CustomTemplate,
                "http://127.0.0.1:1",
            ))
            .unwrap(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/bindings/b1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["data"]["targetProtocol"], "custom-template");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/bindings/b1")
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/bindings/b1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _dir) = app_with(vec![], None).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn sandbox_dry_run_emits_transformed_request_and_done() {
    let mut b = binding("b1", TargetProtocol::CustomTemplate, "http://127.0.0.1:1");
    b.request_template = Some(r#"{"prompt": "{{message.0.text}}"}"#.into());
    let (app, _dir) = app_with(vec![b], None).await;

    let request = Request::builder()
        .uri("/api/sandbox")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "bindingId": "b1", "request": canonical_request(), "execute": false })
                .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("event: trace"));
    assert!(body.contains("event: transformed_request"));
    assert!(body.contains(r#"{"prompt":"hello"}"#));
    assert!(body.contains("event: done"));
}

#[tokio::test]
async fn sandbox_unknown_binding_is_404() {
    let (app, _dir) = app_with(vec![], None).await;
    let request = Request::builder()
        .uri("/api/sandbox")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "bindingId": "ghost", "request": canonical_request() }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Fake chat-completion upstream answering with a short SSE stream.
async fn fake_completion_upstream() -> String {
    async fn completions() -> impl IntoResponse {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        ([("Content-Type", "text/event-stream")], body)
    }

    let app = Router::new().route("/v1/chat/completions", post(completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/chat/completions")
}

/// Upstream that answers with a full (non-stream) completion echoing the
/// Authorization header it received.
async fn fake_auth_echo_upstream() -> String {
    async fn completions(headers: axum::http::HeaderMap) -> impl IntoResponse {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        axum::Json(json!({
            "choices": [{ "message": { "content": auth }, "finish_reason": "stop" }]
        }))
    }

    let app = Router::new().route("/complete", post(completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/complete")
}

#[tokio::test]
async fn header_auth_sends_the_raw_key() {
    let url = fake_auth_echo_upstream().await;
    let mut b = binding("a1", TargetProtocol::HttpCompletion, &url);
    b.auth_type = AuthType::Header;
    b.auth_key = Some("token-abc123".into());
    let (app, _dir) = app_with(vec![b], None).await;

    let response = app
        .oneshot(bridge_post("a1", canonical_request().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sse_data_events(response).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["answer"], "token-abc123");
    assert_eq!(events[0]["is_finish"], true);
}

#[tokio::test]
async fn http_completion_bridges_end_to_end() {
    let url = fake_completion_upstream().await;
    let (app, _dir) = app_with(
        vec![binding("a1", TargetProtocol::HttpCompletion, &url)],
        None,
    )
    .await;

    let response = app
        .clone()
        .oneshot(bridge_post("a1", canonical_request().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sse_data_events(response).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["answer"], "Hel");
    assert_eq!(events[0]["is_finish"], false);
    assert_eq!(events[1]["answer"], "lo");
    assert_eq!(events[1]["is_finish"], true);
    assert_eq!(events[1]["message_id"], "m1");

    // The request was audited.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/logs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["status"], "success");
    assert_eq!(logs[0]["request_summary"], "hello");
}
