use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use iris::adapters::{AppState, FileBindingStore, FileLogStore, RequireApiKey};
use iris::bridge::BridgeEngine;
use iris::cli::Cli;
use iris::config::Settings;
use iris::domain::{BindingStore, LogSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!("Starting Iris protocol bridge on {}:{}", host, port);

    let bindings: Arc<dyn BindingStore> =
        Arc::new(FileBindingStore::load(&settings.stores.bindings_file).await?);
    let logs: Arc<dyn LogSink> = Arc::new(FileLogStore::load(&settings.stores.logs_file).await?);
    info!(
        "Loaded {} binding(s) from {}",
        bindings.list_bindings().await.len(),
        settings.stores.bindings_file.display()
    );

    let engine = Arc::new(BridgeEngine::new(bindings.clone(), logs.clone()));
    let state = AppState {
        engine,
        bindings,
        logs,
    };
    let auth = RequireApiKey {
        api_key: settings.auth.api_key.clone(),
    };
    if auth.api_key.is_some() {
        info!("API key protection enabled for bridge routes");
    }

    let app = iris::create_app(state, auth);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
