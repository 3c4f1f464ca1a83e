//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `voice` - Session start/terminate/status endpoints
//! - `audio_stream` - Audio ingest and broadcast WebSocket

pub mod api;
pub mod audio_stream;
pub mod voice;

pub use audio_stream::audio_stream_handler;
