//! # Iris - canonical agent-protocol bridge
//!
//! Iris accepts canonical chat requests over HTTP and translates them to
//! and from heterogeneous downstream agent protocols:
//!
//! - **http-completion**: chat-completion style HTTP endpoints with SSE
//!   streaming responses
//! - **custom-template**: arbitrary HTTP+JSON endpoints described by
//!   user-defined request/response templates
//! - **stateful-session**: persistent authenticated WebSocket sessions
//!
//! Whatever the downstream speaks, callers always receive a stream of
//! canonical response fragments.
//!
//! ## Architecture
//!
//! Iris follows Hexagonal Architecture:
//! - **Domain**: canonical types, bindings, and collaborator ports
//! - **Bridge**: template expansion, protocol transformation, streaming,
//!   sessions, and the orchestrator
//! - **Adapters**: HTTP handlers and file-backed stores
//! - **Config**: configuration management

pub mod adapters;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod domain;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::adapters::auth_middleware::require_api_key;
use crate::adapters::{api_handler, bridge_handler, AppState, RequireApiKey};

/// Build the application router.
///
/// Bridge and sandbox routes sit behind the API-key middleware (a no-op
/// when no key is configured); management and health routes are open.
pub fn create_app(state: AppState, auth: RequireApiKey) -> Router {
    let public_router = Router::new()
        .route("/health", get(api_handler::health))
        // Bindings CRUD
        .route(
            "/api/bindings",
            get(api_handler::list_bindings).post(api_handler::create_binding),
        )
        .route(
            "/api/bindings/:id",
            get(api_handler::get_binding)
                .put(api_handler::update_binding)
                .delete(api_handler::delete_binding),
        )
        // Logs
        .route("/api/logs", get(api_handler::recent_logs))
        .route("/api/logs/clear", post(api_handler::clear_logs))
        .route("/api/logs/system", get(api_handler::system_logs));

    let protected_router = Router::new()
        .route("/api/bridge/:agent_id", post(bridge_handler::bridge_request))
        .route("/api/sandbox", post(bridge_handler::sandbox))
        .layer(from_fn_with_state(auth, require_api_key));

    public_router
        .merge(protected_router)
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
