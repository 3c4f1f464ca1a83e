use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, voice};
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
///
/// - `GET /` - health check
/// - `POST /start_voice` - start (or replace) the voice session
/// - `POST /terminate_voice` - stop the session and disconnect audio clients
/// - `GET /status` - current session status
/// - `GET /get_transcription` - always `{"transcription": null}`
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/start_voice", post(voice::start_voice))
        .route("/terminate_voice", post(voice::terminate_voice))
        .route("/status", get(voice::session_status))
        .route("/get_transcription", get(voice::get_transcription))
        .layer(TraceLayer::new_for_http())
}
