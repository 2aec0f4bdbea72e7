//! The protocol bridge core
//!
//! Pure translation (templates, transformer), the SSE streaming processor,
//! the stateful WebSocket session client, and the per-request orchestrator.

pub mod engine;
pub mod session;
pub mod stream;
pub mod template;
pub mod token;
pub mod transformer;

pub use engine::BridgeEngine;
pub use session::{SessionClient, SessionRegistry, Subscription};

use thiserror::Error;

/// Errors that can occur while bridging one request
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Binding is missing something the protocol variant requires
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Canonical request cannot feed the target protocol
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Template expansion produced invalid JSON
    #[error("Template expansion failed: {reason} (template: {template})")]
    Template { template: String, reason: String },

    /// Binding names a protocol this build does not speak
    #[error("Protocol {protocol} not supported for {direction} transformation")]
    UnsupportedProtocol {
        protocol: String,
        direction: &'static str,
    },

    /// Connect/HTTP/WebSocket failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Stateful session is unusable for this send
    #[error("Session error: {0}")]
    Session(String),

    /// Per-request deadline elapsed
    #[error("Operation timed out after {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        // The client's deadline is not recoverable from the error, so keep
        // the message instead of fabricating a duration.
        if err.is_timeout() {
            BridgeError::Transport(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            BridgeError::Transport(format!("Connection error: {}", err))
        } else {
            BridgeError::Transport(err.to_string())
        }
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
