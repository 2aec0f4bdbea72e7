//! Adapters: HTTP handlers and the file-backed collaborator stores

pub mod api_handler;
pub mod auth_middleware;
pub mod binding_store;
pub mod bridge_handler;
pub mod log_store;

pub use auth_middleware::RequireApiKey;
pub use binding_store::FileBindingStore;
pub use log_store::FileLogStore;

use std::sync::Arc;

use crate::bridge::BridgeEngine;
use crate::domain::{BindingStore, LogSink};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BridgeEngine>,
    pub bindings: Arc<dyn BindingStore>,
    pub logs: Arc<dyn LogSink>,
}
