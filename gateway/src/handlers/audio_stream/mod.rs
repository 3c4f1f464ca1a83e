//! Audio stream WebSocket
//!
//! ## Client → Server
//!
//! - `{"type": "audio", "format": "audio/pcm", "data": "<base64>"}`
//! - `{"type": "control", "command": "start" | "stop"}`
//! - Binary frames, or text that is not JSON: raw PCM
//!
//! ## Server → Client
//!
//! - `{"type": "audio", "format": "audio/wav", "data": "<base64 WAV>"}`
//! - `{"type": "error", "message": "..."}`

mod handler;
mod messages;

pub use handler::{WsSubscriber, audio_stream_handler};
pub use messages::{ControlCommand, IncomingMessage, MessageRoute};
