use axum::Json;
use serde_json::{Value, json};

/// Health check handler
///
/// Returns `{"status": "OK"}`. Public, never touches session state.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}
