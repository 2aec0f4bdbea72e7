//! Application settings
//!
//! Layered configuration: defaults, then an optional TOML file, then
//! `IRIS_*` environment variables, then CLI flags.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Cli;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub stores: StoreSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Where the file-backed stores live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    pub bindings_file: PathBuf,
    pub logs_file: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            bindings_file: PathBuf::from("bindings.json"),
            logs_file: PathBuf::from("logs.json"),
        }
    }
}

/// Inbound API protection. When `api_key` is set, bridge and sandbox
/// endpoints require it as a bearer credential.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        Self::from_file(Path::new("iris.toml"))
    }

    /// Settings from the CLI's config path, with CLI flag overrides on top.
    pub fn new_with_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut settings = Self::from_file(&cli.config)?;
        if let Some(host) = &cli.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            settings.server.port = port;
        }
        if let Some(api_key) = &cli.api_key {
            settings.auth.api_key = Some(api_key.clone());
        }
        Ok(settings)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let s = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("IRIS").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_exists() {
        let settings = Settings::from_file(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.stores.bindings_file, PathBuf::from("bindings.json"));
        assert!(settings.auth.api_key.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iris.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 8080\n\n[auth]\napi_key = \"k\"\n",
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.auth.api_key.as_deref(), Some("k"));
    }
}
