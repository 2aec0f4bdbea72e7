//! Canonical bridge message types
//!
//! These are the only shapes callers ever see, regardless of which target
//! protocol a binding speaks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry in the canonical request's message list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message role ("user", "agent", "system")
    pub role: String,
    /// Message kind ("text", "image", ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Text payload
    #[serde(default)]
    pub text: String,
    /// Optional image reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Canonical request accepted on the bridge endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    /// Caller-chosen id; echoed verbatim in every response fragment
    pub message_id: String,
    /// Target agent id (also the binding id)
    pub agent_id: String,
    /// Conversation messages, newest last
    #[serde(default)]
    pub message: Vec<InboundMessage>,
}

impl BridgeRequest {
    /// Text of the first user-role message, if any.
    ///
    /// Protocols that carry a single instruction string extract it from here.
    pub fn first_user_text(&self) -> Option<&str> {
        self.message
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.text.as_str())
    }
}

/// Canonical response fragment pushed to the caller's event stream
///
/// Zero or more fragments are emitted per request; exactly one carries
/// `is_finish = true`, after which the stream closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeFragment {
    pub role: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub answer_stream: String,
    pub message_id: String,
    pub agent_id: String,
    pub is_finish: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl BridgeFragment {
    /// An answer fragment correlated to the originating request.
    pub fn answer(
        answer: impl Into<String>,
        message_id: impl Into<String>,
        agent_id: impl Into<String>,
        is_finish: bool,
    ) -> Self {
        let answer = answer.into();
        Self {
            role: "agent".to_string(),
            kind: "answer".to_string(),
            answer_stream: answer.clone(),
            answer,
            message_id: message_id.into(),
            agent_id: agent_id.into(),
            is_finish,
            metadata: None,
        }
    }

    /// A terminal error fragment. Always finishes the stream.
    pub fn error(
        message: impl Into<String>,
        message_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            role: "system".to_string(),
            kind: "error".to_string(),
            answer_stream: message.clone(),
            answer: message,
            message_id: message_id.into(),
            agent_id: agent_id.into(),
            is_finish: true,
            metadata: None,
        }
    }
}
