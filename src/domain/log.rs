//! Audit log records
//!
//! Request logs capture one bridge request each; system logs are a bounded
//! in-memory buffer for the live tailer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a bridged request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Pending,
    Success,
    Error,
}

/// One audited bridge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    /// Unix millis
    pub timestamp: i64,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Truncated input text
    pub request_summary: String,
    pub status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_request: Option<Value>,
}

/// Partial update applied to a pending request log
#[derive(Debug, Clone, Default)]
pub struct RequestLogUpdate {
    pub status: Option<LogStatus>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// One line in the system log ring buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLog {
    /// Unix millis
    pub timestamp: i64,
    pub level: String,
    pub message: String,
}
