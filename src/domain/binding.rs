//! Binding configuration
//!
//! A binding names one downstream agent: which protocol it speaks, where it
//! lives, how to authenticate, and (for templated protocols) how to map
//! payloads. Bindings are owned by the config store and read-only to the
//! bridge core; an in-flight request keeps working from the binding it read
//! (concurrent edits are last-read-wins).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Downstream protocol variant a binding speaks
///
/// Unknown names deserialize into `Unsupported` so a stored binding with a
/// protocol this build does not know fails with an error naming it, instead
/// of failing to load the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetProtocol {
    /// Chat-completion style HTTP + SSE
    HttpCompletion,
    /// User-defined HTTP + JSON, driven by request/response templates
    CustomTemplate,
    /// Persistent authenticated WebSocket with JSON envelopes
    StatefulSession,
    /// Anything else found in the store
    #[serde(untagged)]
    Unsupported(String),
}

impl TargetProtocol {
    pub fn name(&self) -> &str {
        match self {
            TargetProtocol::HttpCompletion => "http-completion",
            TargetProtocol::CustomTemplate => "custom-template",
            TargetProtocol::StatefulSession => "stateful-session",
            TargetProtocol::Unsupported(name) => name,
        }
    }
}

/// How the outbound credential is attached
///
/// `Bearer` sends `Authorization: Bearer <key>`; `Header` sends the key as
/// the raw `Authorization` value, for targets whose scheme is not bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Bearer,
    Header,
    #[default]
    None,
}

/// One downstream agent configuration (camelCase on disk and on the wire)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub target_protocol: TargetProtocol,
    pub target_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_match_value: Option<String>,
}
