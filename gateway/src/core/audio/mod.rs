//! Audio primitives shared by the relay pipeline.
//!
//! - `chunk` - the `AudioChunk` unit carried by the outbound queue
//! - `wav` - RIFF/WAVE header construction for PCM payloads

pub mod chunk;
pub mod wav;

pub use chunk::{AudioChunk, DEFAULT_AUDIO_FORMAT};
pub use wav::{WAV_HEADER_SIZE, create_header, create_wav};

/// Sample rate of audio sent upstream (Hz).
pub const SEND_SAMPLE_RATE: u32 = 16000;

/// Sample rate of PCM returned by the upstream provider (Hz).
pub const RECEIVE_SAMPLE_RATE: u32 = 24000;

/// Channel count of relayed audio.
pub const CHANNELS: u16 = 1;

/// Bytes per sample (16-bit PCM).
pub const SAMPLE_WIDTH: u16 = 2;
