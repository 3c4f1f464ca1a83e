//! Gemini Live provider.
//!
//! Bidirectional audio over a single WebSocket:
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Input: 16 kHz PCM, base64 in `realtimeInput.mediaChunks`
//! - Output: 24 kHz PCM, base64 in `serverContent.modelTurn.parts[].inlineData`

mod client;
mod config;
mod messages;

pub use client::{GeminiLiveClient, GeminiLiveStream};
pub use config::{
    DEFAULT_GEMINI_MODEL, GEMINI_LIVE_URL, GEMINI_OUTPUT_SAMPLE_RATE, GeminiVoice,
    normalize_model_name,
};
pub use messages::{ClientMessage, ServerContent, ServerMessage};
