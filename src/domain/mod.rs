//! Domain types and collaborator ports
//!
//! The bridge core depends on these traits only; concrete stores live in
//! `adapters`.

mod binding;
mod log;
mod message;

pub use binding::{AuthType, Binding, TargetProtocol};
pub use log::{LogStatus, RequestLog, RequestLogUpdate, SystemLog};
pub use message::{BridgeFragment, BridgeRequest, InboundMessage};

use async_trait::async_trait;

/// Read/write access to the binding configuration store
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn get_binding(&self, id: &str) -> Option<Binding>;
    async fn list_bindings(&self) -> Vec<Binding>;
    async fn save_binding(&self, binding: Binding) -> anyhow::Result<()>;
    /// Returns true when a binding was actually removed
    async fn delete_binding(&self, id: &str) -> anyhow::Result<bool>;
}

/// Fire-and-forget audit logging
///
/// The bridge never depends on these calls succeeding; implementations
/// swallow and report their own failures.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn add_log(&self, log: RequestLog);
    async fn update_log(&self, id: &str, update: RequestLogUpdate);
    async fn recent_logs(&self, limit: usize) -> Vec<RequestLog>;
    async fn clear_logs(&self);
    async fn add_system_log(&self, level: &str, message: &str);
    /// System log lines newer than `since` (unix millis), oldest first
    async fn system_logs(&self, since: Option<i64>) -> Vec<SystemLog>;
}
