//! Bridge and sandbox HTTP handlers
//!
//! Both endpoints answer with `text/event-stream`. The bridge endpoint
//! relays canonical fragments from the engine; the sandbox endpoint walks
//! the same transformation pipeline step by step with named events, for
//! binding development and debugging.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::bridge::stream::{data_payload, full_body_value, SseDecoder};
use crate::bridge::transformer::{build_request, map_response_fragment};
use crate::domain::{AuthType, Binding, BridgeRequest, TargetProtocol};

use super::AppState;

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

/// POST /api/bridge/:agent_id
///
/// Body is one canonical request; the response streams canonical fragments
/// as SSE `data:` events until finish or error.
pub async fn bridge_request(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Bytes,
) -> Response {
    let request: BridgeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(%agent_id, "Rejecting malformed bridge request: {}", e);
            return bad_request("Invalid JSON");
        }
    };

    let (tx, rx) = mpsc::channel(32);
    let engine = state.engine.clone();
    tokio::spawn(async move {
        engine.handle_request(&agent_id, request, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|fragment| {
        let event = match serde_json::to_string(&fragment) {
            Ok(payload) => Event::default().data(payload),
            Err(e) => {
                tracing::error!("Failed to serialize fragment: {}", e);
                Event::default().data("{}")
            }
        };
        Ok::<Event, Infallible>(event)
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxPayload {
    binding_id: String,
    request: BridgeRequest,
    #[serde(default)]
    execute: bool,
}

/// POST /api/sandbox
///
/// Dry-run (and optionally live) walk of the transformation pipeline for
/// one binding, with named SSE events: `trace`, `transformed_request`,
/// `raw_response_chunk`, `transformed_response_chunk`, `error`, `done`.
pub async fn sandbox(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: SandboxPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return bad_request("Missing bindingId or request"),
    };

    let Some(binding) = state.bindings.get_binding(&payload.binding_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Binding not found" })),
        )
            .into_response();
    };

    let (tx, rx) = mpsc::channel::<Event>(32);
    tokio::spawn(run_sandbox(binding, payload.request, payload.execute, tx));

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

async fn run_sandbox(
    binding: Binding,
    request: BridgeRequest,
    execute: bool,
    tx: mpsc::Sender<Event>,
) {
    let started = Instant::now();
    let send = |event: &'static str, data: Value| {
        let tx = tx.clone();
        async move {
            let payload = match data {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let _ = tx.send(Event::default().event(event).data(payload)).await;
        }
    };
    let trace = |message: String| {
        send(
            "trace",
            Value::String(format!("[{}ms] {}", started.elapsed().as_millis(), message)),
        )
    };

    trace("Starting sandbox execution".into()).await;

    let transformed = match build_request(&binding, &request, "sandbox-test") {
        Ok(transformed) => transformed,
        Err(e) => {
            send("error", json!(format!("Transformation Failed: {}", e))).await;
            send("done", json!({})).await;
            return;
        }
    };
    trace("Request transformed successfully".into()).await;
    send("transformed_request", transformed.clone()).await;

    let is_http = matches!(
        binding.target_protocol,
        TargetProtocol::HttpCompletion | TargetProtocol::CustomTemplate
    );
    if execute && is_http {
        if let Err(e) = execute_http(&binding, &request, &transformed, &send, &trace).await {
            trace(format!("Execution failed: {}", e)).await;
            send("error", json!(format!("Execution Failed: {}", e))).await;
        }
    } else if execute {
        send(
            "error",
            json!("Live execution is only available for HTTP protocols"),
        )
        .await;
    }

    send("done", json!({})).await;
}

async fn execute_http<SF, S, TF, T>(
    binding: &Binding,
    request: &BridgeRequest,
    transformed: &Value,
    send: &SF,
    trace: &TF,
) -> crate::bridge::BridgeResult<()>
where
    SF: Fn(&'static str, Value) -> S,
    S: std::future::Future<Output = ()>,
    TF: Fn(String) -> T,
    T: std::future::Future<Output = ()>,
{
    trace(format!("Sending request to {}", binding.target_url)).await;

    let mut builder = reqwest::Client::new()
        .post(&binding.target_url)
        .header(ACCEPT, "text/event-stream")
        .json(transformed);
    match binding.auth_type {
        AuthType::Bearer => {
            if let Some(key) = binding.auth_key.as_deref() {
                builder = builder.bearer_auth(key);
            }
        }
        AuthType::Header => {
            if let Some(key) = binding.auth_key.as_deref() {
                builder = builder.header(AUTHORIZATION, key);
            }
        }
        AuthType::None => {}
    }
    if let Some(headers) = &binding.custom_headers {
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    let response = builder.send().await?;
    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    let raw_response = if is_event_stream {
        let mut body_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut index = 0u32;
        let mut last_payload: Option<Value> = None;
        while let Some(chunk) = body_stream.next().await {
            let chunk = chunk?;
            let text = String::from_utf8_lossy(&chunk).to_string();
            // Latest decodable payload in this chunk previews the mapping.
            let mut current: Option<Value> = None;
            for line in decoder.feed(&chunk) {
                if let Some(data) = data_payload(&line) {
                    if let Ok(value) = serde_json::from_str::<Value>(data) {
                        current = Some(value);
                    }
                }
            }
            let preview = current.as_ref().and_then(|raw| {
                map_response_fragment(binding, raw, &request.message_id, &request.agent_id)
                    .ok()
                    .and_then(|f| serde_json::to_value(f).ok())
            });
            send(
                "raw_response_chunk",
                json!({
                    "index": index,
                    "data": text,
                    "transformed": preview,
                    "timestamp": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await;
            index += 1;
            if current.is_some() {
                last_payload = current;
            }
        }
        last_payload
    } else {
        let text = response.text().await?;
        let raw = full_body_value(&text);
        send(
            "raw_response_chunk",
            json!({
                "index": 0,
                "data": text,
                "transformed": Value::Null,
                "timestamp": chrono::Utc::now().timestamp_millis(),
            }),
        )
        .await;
        Some(raw)
    };

    trace("Execution success".into()).await;

    if let Some(raw) = raw_response {
        match map_response_fragment(binding, &raw, &request.message_id, &request.agent_id) {
            Ok(fragment) => {
                trace("Response transformed".into()).await;
                if let Ok(value) = serde_json::to_value(fragment) {
                    send("transformed_response_chunk", value).await;
                }
            }
            Err(e) => {
                send(
                    "error",
                    json!(format!("Response Transformation Failed: {}", e)),
                )
                .await;
            }
        }
    }
    Ok(())
}
