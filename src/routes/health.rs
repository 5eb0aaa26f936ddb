use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Liveness plus chat store reachability. An unreachable store answers 503.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (store, reachable) = state.chat_service.store_status().await;
    match reachable {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": env!("CARGO_PKG_NAME"),
                "store": store,
            })),
        ),
        Err(e) => {
            tracing::warn!(store, error = %e, "health check: chat store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "service": env!("CARGO_PKG_NAME"),
                    "store": store,
                    "retryable": e.is_retryable(),
                })),
            )
        }
    }
}
