//! Audio stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::audio_stream::audio_stream_handler;
use crate::handlers::voice::AUDIO_STREAM_PATH;
use crate::state::AppState;
use std::sync::Arc;

/// Create the audio stream WebSocket router
///
/// # Endpoint
///
/// `GET /audio-stream` - WebSocket upgrade for bidirectional audio
///
/// # Example
///
/// ```json
/// // Client sends audio
/// {"type": "audio", "format": "audio/pcm", "data": "<base64 PCM>"}
///
/// // Server broadcasts responses
/// {"type": "audio", "format": "audio/wav", "data": "<base64 WAV>"}
/// ```
pub fn create_audio_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(AUDIO_STREAM_PATH, get(audio_stream_handler))
        .layer(TraceLayer::new_for_http())
}
