//! Bearer-key protection for the bridge endpoints

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Middleware state: when `api_key` is `None` the check is disabled and
/// every request passes through.
#[derive(Clone)]
pub struct RequireApiKey {
    pub api_key: Option<String>,
}

pub async fn require_api_key(
    State(auth): State<RequireApiKey>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = auth.api_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if key == expected => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": "Invalid or missing API key",
            })),
        )
            .into_response(),
    }
}
