//! Protocol transformer
//!
//! Stateless mapping between the canonical schema and each target protocol:
//! `build_request` produces the outbound payload, `map_response_fragment`
//! turns one raw target fragment into a canonical fragment. The fragment's
//! `message_id` always echoes the originating request, whatever correlation
//! scheme the target uses.

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{Binding, BridgeFragment, BridgeRequest, TargetProtocol};

use super::template::expand;
use super::{BridgeError, BridgeResult};

/// Session envelope discriminators, stamped on every stateful-session send.
const SESSION_MSG_TYPE: &str = "client_test";
const SESSION_BIZ_TYPE: &str = "test_agent";

/// Statuses a stateful-session backend reports on its last message.
const TERMINAL_STATUSES: [&str; 2] = ["finish", "failed"];

/// Build the target-protocol request payload for `binding`.
pub fn build_request(
    binding: &Binding,
    request: &BridgeRequest,
    correlation_id: &str,
) -> BridgeResult<Value> {
    match &binding.target_protocol {
        TargetProtocol::CustomTemplate => {
            let template = binding.request_template.as_deref().ok_or_else(|| {
                BridgeError::Configuration(
                    "Request template required for custom-template protocol".to_string(),
                )
            })?;
            expand(template, &serde_json::to_value(request)?)
        }
        TargetProtocol::HttpCompletion => {
            if let Some(template) = binding.request_template.as_deref() {
                return expand(template, &serde_json::to_value(request)?);
            }
            let messages: Vec<Value> = request
                .message
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.text }))
                .collect();
            Ok(json!({
                "model": binding.model.as_deref().unwrap_or("gpt-3.5-turbo"),
                "messages": messages,
                "stream": true,
            }))
        }
        TargetProtocol::StatefulSession => {
            let instruction = request.first_user_text().ok_or_else(|| {
                BridgeError::InvalidRequest(
                    "request has no user message to extract an instruction from".to_string(),
                )
            })?;
            Ok(json!({
                "timestamp": Utc::now().timestamp_millis(),
                "conversation_id": correlation_id,
                "msg_type": SESSION_MSG_TYPE,
                "msg_id": Uuid::new_v4().to_string(),
                "data": {
                    "biz_type": SESSION_BIZ_TYPE,
                    "instruction": instruction,
                },
            }))
        }
        TargetProtocol::Unsupported(name) => Err(BridgeError::UnsupportedProtocol {
            protocol: name.clone(),
            direction: "request",
        }),
    }
}

/// Map one raw target fragment to a canonical fragment.
pub fn map_response_fragment(
    binding: &Binding,
    raw: &Value,
    message_id: &str,
    agent_id: &str,
) -> BridgeResult<BridgeFragment> {
    let (answer, raw_finish) = match &binding.target_protocol {
        TargetProtocol::CustomTemplate => match binding.response_template.as_deref() {
            Some(template) => mapped_from_template(template, raw)?,
            // No response template: the whole raw fragment is the answer and
            // the exchange is complete.
            None => (raw.to_string(), Value::Bool(true)),
        },
        TargetProtocol::HttpCompletion => match binding.response_template.as_deref() {
            Some(template) => mapped_from_template(template, raw)?,
            None => completion_defaults(raw),
        },
        TargetProtocol::StatefulSession => {
            let status = raw.get("status").and_then(Value::as_str).unwrap_or("");
            let terminal = TERMINAL_STATUSES.contains(&status);
            let answer = match raw.get("data") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            (answer, Value::Bool(terminal))
        }
        TargetProtocol::Unsupported(name) => {
            return Err(BridgeError::UnsupportedProtocol {
                protocol: name.clone(),
                direction: "response",
            })
        }
    };

    let is_finish = resolve_finish(&raw_finish, binding.finish_match_value.as_deref());
    Ok(BridgeFragment::answer(answer, message_id, agent_id, is_finish))
}

/// Expand a response template and pull out the answer text and the raw
/// finish indicator (whatever type the template mapped it to).
fn mapped_from_template(template: &str, raw: &Value) -> BridgeResult<(String, Value)> {
    let mapped = expand(template, raw)?;
    let answer = mapped_text(&mapped, "answer_stream")
        .or_else(|| mapped_text(&mapped, "answer"))
        .unwrap_or_default();
    let raw_finish = mapped.get("is_finish").cloned().unwrap_or(Value::Null);
    Ok((answer, raw_finish))
}

/// Non-empty string form of a mapped field.
fn mapped_text(mapped: &Value, key: &str) -> Option<String> {
    match mapped.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Default content/finish extraction for chat-completion responses.
///
/// Content priority: streaming delta, full message content, plain text
/// field, then a generic `text_response`.
fn completion_defaults(raw: &Value) -> (String, Value) {
    let choice = raw.get("choices").and_then(|c| c.get(0));
    let content = choice
        .and_then(|c| c.pointer("/delta/content"))
        .and_then(Value::as_str)
        .or_else(|| {
            choice
                .and_then(|c| c.pointer("/message/content"))
                .and_then(Value::as_str)
        })
        .or_else(|| choice.and_then(|c| c.get("text")).and_then(Value::as_str))
        .or_else(|| raw.get("text_response").and_then(Value::as_str))
        .unwrap_or("")
        .to_string();

    let raw_finish = choice
        .and_then(|c| c.get("finish_reason"))
        .filter(|v| !v.is_null())
        .or_else(|| raw.get("finish_reason").filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or(Value::Bool(false));

    (content, raw_finish)
}

/// Two-tier finish resolution, applied uniformly to every variant.
///
/// A configured match value wins: finish is a case-sensitive string
/// comparison against the coerced indicator. Otherwise the indicator is
/// coerced to a boolean the way loose JSON truthiness works (empty objects
/// and arrays are truthy).
pub fn resolve_finish(raw: &Value, finish_match: Option<&str>) -> bool {
    match finish_match {
        Some(expected) => coerce_string(raw) == expected,
        None => truthy(raw),
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::InvalidRequest(err.to_string())
    }
}
