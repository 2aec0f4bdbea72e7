//! Stateful session client
//!
//! One long-lived authenticated WebSocket connection per agent, created
//! lazily on the first stateful request and reused across requests. The
//! connection is torn down only on close/error (the next request then
//! reconnects) or an explicit disconnect, never because a single request
//! finished or was cancelled.
//!
//! The wire protocol does not echo the caller's correlation id reliably, so
//! every inbound frame fans out to all subscriptions; each request applies
//! its own finish and timeout logic. Concurrent requests on one agent may
//! see interleaved replies.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Notify, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::Binding;

use super::token::derive_bearer_token;
use super::{BridgeError, BridgeResult};

/// Deadline for the connection-open wait.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Fan-out capacity for inbound frames.
const INBOUND_CAPACITY: usize = 64;

/// A live (or once-live) session to one agent.
///
/// Connectedness is a watch channel so that attached subscriptions end as
/// soon as the session goes down, instead of waiting out their own
/// deadlines.
#[derive(Debug)]
pub struct SessionClient {
    agent_id: String,
    connected: Arc<watch::Sender<bool>>,
    outbound: mpsc::Sender<String>,
    inbound: broadcast::Sender<Value>,
    close: Arc<Notify>,
}

impl SessionClient {
    /// Open a session with a single cancellable connect: the deadline and
    /// the handshake resolve into exactly one connected-or-error outcome.
    pub async fn connect(
        agent_id: &str,
        url: &str,
        bearer: Option<&str>,
    ) -> BridgeResult<Arc<Self>> {
        let mut ws_request = url
            .into_client_request()
            .map_err(|e| BridgeError::Configuration(format!("Invalid session URL {}: {}", url, e)))?;
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| BridgeError::Configuration(format!("Invalid auth key: {}", e)))?;
            ws_request.headers_mut().insert(AUTHORIZATION, value);
        }

        let handshake = tokio::time::timeout(
            std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(ws_request),
        )
        .await;
        let (ws, _response) = match handshake {
            Err(_) => return Err(BridgeError::Timeout(CONNECT_TIMEOUT_SECS)),
            Ok(Err(e)) => return Err(BridgeError::Transport(format!("Session connect failed: {}", e))),
            Ok(Ok(ok)) => ok,
        };
        tracing::info!(agent_id, "Session connected");

        let (mut sink, mut source) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(32);
        let (inbound_tx, _) = broadcast::channel(INBOUND_CAPACITY);
        let (connected_tx, _) = watch::channel(true);
        let connected = Arc::new(connected_tx);
        let close = Arc::new(Notify::new());

        // Writer: the channel serializes concurrent sends onto the socket.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: parse frames as JSON and broadcast to every subscription.
        let reader_connected = connected.clone();
        let reader_inbound = inbound_tx.clone();
        let reader_close = close.clone();
        let reader_agent = agent_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_close.notified() => break,
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                            Ok(message) => {
                                let _ = reader_inbound.send(message);
                            }
                            Err(e) => {
                                tracing::warn!(agent_id = %reader_agent, "Skipping unparseable session message: {}", e);
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(agent_id = %reader_agent, "Session read error: {}", e);
                            break;
                        }
                    },
                }
            }
            let _ = reader_connected.send_replace(false);
            tracing::info!(agent_id = %reader_agent, "Session disconnected");
        });

        Ok(Arc::new(Self {
            agent_id: agent_id.to_string(),
            connected,
            outbound: outbound_tx,
            inbound: inbound_tx,
            close,
        }))
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Queue one JSON message for the writer task.
    ///
    /// Fails fast when the session is down; sends are never buffered across
    /// reconnects.
    pub async fn send(&self, payload: &Value) -> BridgeResult<()> {
        if !self.is_connected() {
            return Err(BridgeError::Session(format!(
                "session for {} is not connected",
                self.agent_id
            )));
        }
        self.outbound
            .send(payload.to_string())
            .await
            .map_err(|_| BridgeError::Session("session writer has shut down".to_string()))
    }

    /// Attach a listener for inbound messages matching `predicate`.
    ///
    /// Dropping the handle detaches it.
    pub fn subscribe<P>(&self, predicate: P) -> Subscription
    where
        P: Fn(&Value) -> bool + Send + 'static,
    {
        Subscription {
            rx: self.inbound.subscribe(),
            session_down: self.connected.subscribe(),
            predicate: Box::new(predicate),
        }
    }

    /// Mark the session closed and stop both pump tasks.
    pub fn close(&self) {
        let _ = self.connected.send_replace(false);
        self.close.notify_one();
    }
}

/// Handle to a stream of session messages; cancel by dropping.
pub struct Subscription {
    rx: broadcast::Receiver<Value>,
    session_down: watch::Receiver<bool>,
    predicate: Box<dyn Fn(&Value) -> bool + Send>,
}

impl Subscription {
    /// Next matching message, or `None` once the session is gone.
    ///
    /// Messages already broadcast before a disconnect are still delivered;
    /// the biased select drains the inbound buffer first.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            tokio::select! {
                biased;
                message = self.rx.recv() => match message {
                    Ok(message) if (self.predicate)(&message) => return Some(message),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscription lagged, skipped {} messages", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                _ = self.session_down.wait_for(|connected| !connected) => return None,
            }
        }
    }
}

/// Process-wide registry of live sessions, keyed by agent id.
///
/// Connections persist for the process lifetime or until a remote
/// close/error; idle sessions are not reaped.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionClient>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the agent's live session or open a fresh one.
    ///
    /// A session found disconnected (prior transport error) is replaced, so
    /// retry happens at session granularity, not inside a failed request.
    pub async fn get_or_connect(&self, binding: &Binding) -> BridgeResult<Arc<SessionClient>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(client) = sessions.get(&binding.id) {
                if client.is_connected() {
                    return Ok(client.clone());
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(client) = sessions.get(&binding.id) {
            if client.is_connected() {
                return Ok(client.clone());
            }
        }

        let bearer = binding.auth_key.as_deref().map(derive_bearer_token);
        let client =
            SessionClient::connect(&binding.id, &binding.target_url, bearer.as_deref()).await?;
        sessions.insert(binding.id.clone(), client.clone());
        Ok(client)
    }

    /// Explicit teardown of one agent's session.
    pub async fn disconnect(&self, agent_id: &str) {
        if let Some(client) = self.sessions.write().await.remove(agent_id) {
            client.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// One-shot echo agent: accepts a connection, reads an envelope, replies
    /// with a terminal status message.
    async fn spawn_fake_agent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let envelope: Value = serde_json::from_str(&text).unwrap();
                    let reply = json!({
                        "status": "finish",
                        "data": format!("echo: {}", envelope["data"]["instruction"].as_str().unwrap_or("")),
                    });
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                }
            }
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let url = spawn_fake_agent().await;
        let client = SessionClient::connect("a1", &url, Some("token")).await.unwrap();
        assert!(client.is_connected());

        let mut sub = client.subscribe(|_| true);
        client
            .send(&json!({"data": {"instruction": "hi"}}))
            .await
            .unwrap();

        let reply = sub.recv().await.unwrap();
        assert_eq!(reply["status"], "finish");
        assert_eq!(reply["data"], "echo: hi");
    }

    #[tokio::test]
    async fn send_fails_fast_after_close() {
        let url = spawn_fake_agent().await;
        let client = SessionClient::connect("a1", &url, None).await.unwrap();
        client.close();
        let err = client.send(&json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::Session(_)));
    }

    #[tokio::test]
    async fn registry_reuses_live_sessions() {
        let url = spawn_fake_agent().await;
        let registry = SessionRegistry::new();
        let binding = Binding {
            id: "a1".into(),
            name: String::new(),
            enabled: true,
            target_protocol: crate::domain::TargetProtocol::StatefulSession,
            target_url: url,
            model: None,
            auth_type: crate::domain::AuthType::Bearer,
            auth_key: Some("id.secret".into()),
            custom_headers: None,
            request_template: None,
            response_template: None,
            finish_match_value: None,
        };

        let first = registry.get_or_connect(&binding).await.unwrap();
        let second = registry.get_or_connect(&binding).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry.disconnect("a1").await;
        assert!(!first.is_connected());
    }

    #[tokio::test]
    async fn subscription_ends_when_remote_closes() {
        // Agent replies once without a finish, then drops the connection.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text(
                json!({"status": "running", "data": "partial"}).to_string(),
            ))
            .await
            .unwrap();
        });

        let client = SessionClient::connect("a1", &format!("ws://{}", addr), None)
            .await
            .unwrap();
        let mut sub = client.subscribe(|_| true);
        client
            .send(&json!({"data": {"instruction": "hi"}}))
            .await
            .unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(first["status"], "running");

        // The subscription must end promptly, not wait out a deadline.
        let next = tokio::time::timeout(std::time::Duration::from_secs(2), sub.recv())
            .await
            .expect("recv should end promptly after remote close");
        assert!(next.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn connect_refused_is_a_transport_error() {
        let err = SessionClient::connect("a1", "ws://127.0.0.1:1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }

    #[tokio::test]
    async fn subscription_predicate_filters() {
        let url = spawn_fake_agent().await;
        let client = SessionClient::connect("a1", &url, None).await.unwrap();

        let mut finished_only = client.subscribe(|m| m["status"] == "finish");
        client
            .send(&json!({"data": {"instruction": "x"}}))
            .await
            .unwrap();
        let reply = finished_only.recv().await.unwrap();
        assert_eq!(reply["status"], "finish");
    }
}
