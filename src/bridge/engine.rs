//! Bridge orchestrator
//!
//! One task per caller request: look up the binding, pick the strategy
//! (plain HTTP+SSE or stateful session), drive the transformer and the
//! streaming processor, and push canonical fragments to the caller until
//! finish, error, or timeout. Every error surfaces as exactly one canonical
//! error fragment; the outbound stream closes on every path because the
//! fragment sender is dropped when this task returns.

use chrono::Utc;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{
    AuthType, Binding, BindingStore, BridgeFragment, BridgeRequest, LogSink, LogStatus,
    RequestLog, RequestLogUpdate, TargetProtocol,
};

use super::session::SessionRegistry;
use super::stream::{full_body_value, pump_event_stream};
use super::transformer::{build_request, map_response_fragment};
use super::{BridgeError, BridgeResult};

/// Force-detach deadline for a stateful-session listener. Prevents listener
/// leakage across many requests sharing one session.
const SESSION_REPLY_TIMEOUT_SECS: u64 = 60;

const SUMMARY_MAX_CHARS: usize = 120;

/// Per-request bridge orchestrator plus the process-wide session registry.
pub struct BridgeEngine {
    bindings: Arc<dyn BindingStore>,
    logs: Arc<dyn LogSink>,
    http: reqwest::Client,
    sessions: SessionRegistry,
}

impl BridgeEngine {
    pub fn new(bindings: Arc<dyn BindingStore>, logs: Arc<dyn LogSink>) -> Self {
        Self {
            bindings,
            logs,
            http: reqwest::Client::new(),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Bridge one canonical request, emitting fragments on `tx`.
    ///
    /// The caller's stream closes when the last sender clone is dropped;
    /// this method never leaves the caller hanging.
    pub async fn handle_request(
        &self,
        agent_id: &str,
        request: BridgeRequest,
        tx: mpsc::Sender<BridgeFragment>,
    ) {
        let Some(binding) = self.bindings.get_binding(agent_id).await else {
            let _ = tx
                .send(BridgeFragment::error(
                    "Agent not found or disabled",
                    &request.message_id,
                    agent_id,
                ))
                .await;
            return;
        };
        if !binding.enabled {
            let _ = tx
                .send(BridgeFragment::error(
                    "Agent not found or disabled",
                    &request.message_id,
                    agent_id,
                ))
                .await;
            return;
        }

        let log_id = Uuid::new_v4().to_string();
        let started = std::time::Instant::now();
        self.logs
            .add_log(RequestLog {
                id: log_id.clone(),
                timestamp: Utc::now().timestamp_millis(),
                agent_id: agent_id.to_string(),
                agent_name: Some(binding.name.clone()).filter(|n| !n.is_empty()),
                request_summary: summarize(&request),
                status: LogStatus::Pending,
                duration_ms: None,
                error_message: None,
                full_request: serde_json::to_value(&request).ok(),
            })
            .await;

        let result = self.dispatch(&binding, &request, &tx).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(()) => {
                self.logs
                    .update_log(
                        &log_id,
                        RequestLogUpdate {
                            status: Some(LogStatus::Success),
                            duration_ms: Some(duration_ms),
                            error_message: None,
                        },
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(agent_id, "Bridge request failed: {}", e);
                self.logs
                    .add_system_log("error", &format!("bridge {}: {}", agent_id, e))
                    .await;
                let _ = tx
                    .send(BridgeFragment::error(
                        format!("Protocol Error: {}", e),
                        &request.message_id,
                        agent_id,
                    ))
                    .await;
                self.logs
                    .update_log(
                        &log_id,
                        RequestLogUpdate {
                            status: Some(LogStatus::Error),
                            duration_ms: Some(duration_ms),
                            error_message: Some(e.to_string()),
                        },
                    )
                    .await;
            }
        }
    }

    async fn dispatch(
        &self,
        binding: &Binding,
        request: &BridgeRequest,
        tx: &mpsc::Sender<BridgeFragment>,
    ) -> BridgeResult<()> {
        match &binding.target_protocol {
            TargetProtocol::HttpCompletion | TargetProtocol::CustomTemplate => {
                self.dispatch_http(binding, request, tx).await
            }
            TargetProtocol::StatefulSession => self.dispatch_session(binding, request, tx).await,
            TargetProtocol::Unsupported(name) => Err(BridgeError::UnsupportedProtocol {
                protocol: name.clone(),
                direction: "request",
            }),
        }
    }

    /// Plain HTTP strategy: POST the transformed payload, then either pump
    /// the SSE response or map the single full body.
    async fn dispatch_http(
        &self,
        binding: &Binding,
        request: &BridgeRequest,
        tx: &mpsc::Sender<BridgeFragment>,
    ) -> BridgeResult<()> {
        let correlation_id = Uuid::new_v4().to_string();
        let payload = build_request(binding, request, &correlation_id)?;

        let mut builder = self
            .http
            .post(&binding.target_url)
            .header(ACCEPT, "text/event-stream")
            .json(&payload);
        match binding.auth_type {
            AuthType::Bearer => {
                if let Some(key) = binding.auth_key.as_deref() {
                    builder = builder.bearer_auth(key);
                }
            }
            // Raw credential in the Authorization header, no bearer prefix.
            AuthType::Header => {
                if let Some(key) = binding.auth_key.as_deref() {
                    match HeaderValue::from_str(key) {
                        Ok(value) => builder = builder.header(AUTHORIZATION, value),
                        Err(e) => tracing::warn!("Skipping invalid auth header value: {}", e),
                    }
                }
            }
            AuthType::None => {}
        }
        if let Some(headers) = &binding.custom_headers {
            for (name, value) in headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => builder = builder.header(name, value),
                    _ => tracing::warn!(header = %name, "Skipping invalid custom header"),
                }
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            pump_event_stream(response.bytes_stream(), binding, request, tx).await
        } else {
            let text = response.text().await?;
            let raw = full_body_value(&text);
            let fragment =
                map_response_fragment(binding, &raw, &request.message_id, &request.agent_id)?;
            let _ = tx.send(fragment).await;
            Ok(())
        }
    }

    /// Stateful strategy: reuse or open the agent's session, send the
    /// envelope, and relay replies until a finish fragment or the safety
    /// deadline. A session closed before finish is a session error.
    async fn dispatch_session(
        &self,
        binding: &Binding,
        request: &BridgeRequest,
        tx: &mpsc::Sender<BridgeFragment>,
    ) -> BridgeResult<()> {
        let correlation_id = Uuid::new_v4().to_string();
        let payload = build_request(binding, request, &correlation_id)?;

        let client = self.sessions.get_or_connect(binding).await?;
        // Attach before sending so no reply can slip past.
        let mut subscription = client.subscribe(|_: &Value| true);
        client.send(&payload).await?;

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(SESSION_REPLY_TIMEOUT_SECS);
        loop {
            let message = match tokio::time::timeout_at(deadline, subscription.recv()).await {
                // Safety timeout: detach the listener, close the caller's
                // stream without a synthesized finish fragment.
                Err(_) => {
                    tracing::warn!(
                        agent_id = %request.agent_id,
                        "Detaching session listener after {}s without finish",
                        SESSION_REPLY_TIMEOUT_SECS
                    );
                    return Ok(());
                }
                // Remote closed or errored mid-request; the caller gets a
                // terminal error fragment and the next request reconnects.
                Ok(None) => {
                    return Err(BridgeError::Session(
                        "session closed before the reply finished".to_string(),
                    ))
                }
                Ok(Some(message)) => message,
            };

            match map_response_fragment(binding, &message, &request.message_id, &request.agent_id)
            {
                Ok(fragment) => {
                    let finished = fragment.is_finish;
                    if tx.send(fragment).await.is_err() || finished {
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(agent_id = %request.agent_id, "Skipping unmappable session message: {}", e);
                }
            }
        }
    }
}

fn summarize(request: &BridgeRequest) -> String {
    let text = request.first_user_text().unwrap_or(&request.message_id);
    text.chars().take(SUMMARY_MAX_CHARS).collect()
}
