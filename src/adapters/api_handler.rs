//! REST API handlers for binding and log management
//!
//! CRUD over the binding store plus read access to the request audit log
//! and the system log buffer.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::Binding;

use super::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

// ============================================================================
// Bindings CRUD
// ============================================================================

pub async fn list_bindings(State(state): State<AppState>) -> impl IntoResponse {
    let bindings = state.bindings.list_bindings().await;
    (StatusCode::OK, Json(ApiResponse::success(bindings)))
}

pub async fn get_binding(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.bindings.get_binding(&id).await {
        Some(binding) => (StatusCode::OK, Json(ApiResponse::success(binding))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Binding not found")),
        ),
    }
}

pub async fn create_binding(
    State(state): State<AppState>,
    Json(binding): Json<Binding>,
) -> impl IntoResponse {
    if binding.id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<Binding>::error("Binding id must not be empty")),
        );
    }
    if state.bindings.get_binding(&binding.id).await.is_some() {
        return (
            StatusCode::CONFLICT,
            Json(ApiResponse::<Binding>::error("Binding already exists")),
        );
    }
    match state.bindings.save_binding(binding.clone()).await {
        Ok(()) => (StatusCode::CREATED, Json(ApiResponse::success(binding))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<Binding>::error(e.to_string())),
        ),
    }
}

pub async fn update_binding(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut binding): Json<Binding>,
) -> impl IntoResponse {
    if state.bindings.get_binding(&id).await.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<Binding>::error("Binding not found")),
        );
    }
    // The path is authoritative for the id.
    binding.id = id;
    match state.bindings.save_binding(binding.clone()).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success(binding))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<Binding>::error(e.to_string())),
        ),
    }
}

pub async fn delete_binding(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.bindings.delete_binding(&id).await {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::<()>::ok())),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("Binding not found")),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(e.to_string())),
        ),
    }
}

// ============================================================================
// Logs
// ============================================================================

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let logs = state.logs.recent_logs(limit).await;
    (StatusCode::OK, Json(ApiResponse::success(logs)))
}

pub async fn clear_logs(State(state): State<AppState>) -> impl IntoResponse {
    state.logs.clear_logs().await;
    (StatusCode::OK, Json(ApiResponse::<()>::ok()))
}

#[derive(Deserialize)]
pub struct SystemLogsQuery {
    pub since: Option<i64>,
}

pub async fn system_logs(
    State(state): State<AppState>,
    Query(query): Query<SystemLogsQuery>,
) -> impl IntoResponse {
    let logs = state.logs.system_logs(query.since).await;
    (StatusCode::OK, Json(ApiResponse::success(logs)))
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
}

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthInfo {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
