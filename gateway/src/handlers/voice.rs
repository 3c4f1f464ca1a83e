//! Voice session control endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::HOST},
};
use serde::Serialize;
use tracing::info;

use crate::core::session::SessionStatus;
use crate::errors::AppResult;
use crate::state::AppState;

/// Path of the audio WebSocket, relative to the server root.
pub const AUDIO_STREAM_PATH: &str = "/audio-stream";

/// Sub-protocol name advertised to clients.
pub const AUDIO_STREAM_PROTOCOL: &str = "audio-stream";

#[derive(Debug, Serialize)]
pub struct WebSocketInfo {
    pub url: String,
    pub protocol: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StartVoiceResponse {
    pub status: &'static str,
    pub session_id: Option<String>,
    pub websocket: WebSocketInfo,
}

#[derive(Debug, Serialize)]
pub struct TerminateVoiceResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub transcription: Option<String>,
}

/// Start a new voice session, replacing any active one.
pub async fn start_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<StartVoiceResponse>> {
    let status = state.sessions.start_default().await?;
    info!(session_id = ?status.session_id, "Voice session started");

    Ok(Json(StartVoiceResponse {
        status: "started",
        session_id: status.session_id,
        websocket: WebSocketInfo {
            url: websocket_url(&headers, state.config.is_tls_enabled()),
            protocol: AUDIO_STREAM_PROTOCOL,
        },
    }))
}

/// Stop the session and disconnect every audio client. Always succeeds.
pub async fn terminate_voice(State(state): State<Arc<AppState>>) -> Json<TerminateVoiceResponse> {
    state.sessions.terminate().await;
    Json(TerminateVoiceResponse {
        status: "terminated",
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub session: SessionStatus,
}

/// Service health plus the current session snapshot.
pub async fn session_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        session: state.sessions.status(),
    })
}

/// Transcription is not produced by the relay; kept for client compatibility.
pub async fn get_transcription() -> Json<TranscriptionResponse> {
    Json(TranscriptionResponse {
        transcription: None,
    })
}

/// Build the audio WebSocket URL from the request's Host header.
///
/// The scheme is `wss` when TLS terminates here or a proxy reports https.
fn websocket_url(headers: &HeaderMap, tls_enabled: bool) -> String {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    let forwarded_https = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));

    let scheme = if tls_enabled || forwarded_https {
        "wss"
    } else {
        "ws"
    };
    format!("{scheme}://{host}{AUDIO_STREAM_PATH}")
}
