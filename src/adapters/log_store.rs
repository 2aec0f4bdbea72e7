//! Request audit log and system log buffer
//!
//! Request logs persist to a JSON file (newest first, capped); system logs
//! are an in-memory ring buffer only. Persistence failures are reported via
//! tracing rather than propagated, the audit trail must never break a
//! bridge request.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::domain::{LogSink, RequestLog, RequestLogUpdate, SystemLog};

const MAX_REQUEST_LOGS: usize = 10_000;
const MAX_SYSTEM_LOGS: usize = 5_000;

pub struct FileLogStore {
    path: PathBuf,
    requests: RwLock<Vec<RequestLog>>,
    system: RwLock<VecDeque<SystemLog>>,
}

impl FileLogStore {
    /// Load persisted request logs, treating a missing file as empty.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let requests = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unparseable logs file {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            requests: RwLock::new(requests),
            system: RwLock::new(VecDeque::new()),
        })
    }

    async fn persist(&self, requests: &[RequestLog]) {
        let content = match serde_json::to_string_pretty(requests) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to serialize request logs: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, content).await {
            tracing::error!("Failed to persist request logs to {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl LogSink for FileLogStore {
    async fn add_log(&self, log: RequestLog) {
        let mut requests = self.requests.write().await;
        requests.insert(0, log);
        requests.truncate(MAX_REQUEST_LOGS);
        self.persist(&requests).await;
    }

    async fn update_log(&self, id: &str, update: RequestLogUpdate) {
        let mut requests = self.requests.write().await;
        let Some(log) = requests.iter_mut().find(|l| l.id == id) else {
            tracing::warn!("Attempted to update unknown request log {}", id);
            return;
        };
        if let Some(status) = update.status {
            log.status = status;
        }
        if let Some(duration_ms) = update.duration_ms {
            log.duration_ms = Some(duration_ms);
        }
        if let Some(error_message) = update.error_message {
            log.error_message = Some(error_message);
        }
        self.persist(&requests).await;
    }

    async fn recent_logs(&self, limit: usize) -> Vec<RequestLog> {
        let requests = self.requests.read().await;
        requests.iter().take(limit).cloned().collect()
    }

    async fn clear_logs(&self) {
        let mut requests = self.requests.write().await;
        requests.clear();
        self.persist(&requests).await;
    }

    async fn add_system_log(&self, level: &str, message: &str) {
        let mut system = self.system.write().await;
        system.push_back(SystemLog {
            timestamp: chrono::Utc::now().timestamp_millis(),
            level: level.to_string(),
            message: message.to_string(),
        });
        while system.len() > MAX_SYSTEM_LOGS {
            system.pop_front();
        }
    }

    async fn system_logs(&self, since: Option<i64>) -> Vec<SystemLog> {
        let system = self.system.read().await;
        match since {
            Some(since) => system.iter().filter(|l| l.timestamp > since).cloned().collect(),
            None => system.iter().cloned().collect(),
        }
    }
}
