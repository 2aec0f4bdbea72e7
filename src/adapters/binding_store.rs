//! JSON-file-backed binding store
//!
//! The whole store is one JSON array of bindings, loaded at startup and
//! rewritten on every mutation. Reads are served from memory; the bridge
//! core holds the `BindingStore` port, never this type directly.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::domain::{Binding, BindingStore};

pub struct FileBindingStore {
    path: PathBuf,
    bindings: RwLock<Vec<Binding>>,
}

impl FileBindingStore {
    /// Load the store, treating a missing file as empty.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let bindings = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unparseable bindings file {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            bindings: RwLock::new(bindings),
        })
    }

    async fn persist(&self, bindings: &[Binding]) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(bindings)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl BindingStore for FileBindingStore {
    async fn get_binding(&self, id: &str) -> Option<Binding> {
        self.bindings
            .read()
            .await
            .iter()
            .find(|b| b.id == id)
            .cloned()
    }

    async fn list_bindings(&self) -> Vec<Binding> {
        self.bindings.read().await.clone()
    }

    async fn save_binding(&self, binding: Binding) -> anyhow::Result<()> {
        let mut bindings = self.bindings.write().await;
        match bindings.iter_mut().find(|b| b.id == binding.id) {
            Some(existing) => *existing = binding,
            None => bindings.push(binding),
        }
        self.persist(&bindings).await
    }

    async fn delete_binding(&self, id: &str) -> anyhow::Result<bool> {
        let mut bindings = self.bindings.write().await;
        let before = bindings.len();
        bindings.retain(|b| b.id != id);
        let removed = bindings.len() != before;
        if removed {
            self.persist(&bindings).await?;
        }
        Ok(removed)
    }
}
