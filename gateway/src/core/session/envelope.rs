//! JSON envelopes delivered to subscribers.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::audio::create_wav;

/// MIME type of broadcast audio.
pub const WAV_FORMAT: &str = "audio/wav";

/// Messages pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEnvelope {
    /// Framed audio, base64 WAV
    Audio { format: String, data: String },
    /// Error notification
    Error { message: String },
}

impl RelayEnvelope {
    /// Frame raw PCM as WAV and wrap it in an audio envelope.
    pub fn wav_audio(pcm: &[u8], sample_rate: u32, channels: u16, sample_width: u16) -> Self {
        let wav = create_wav(pcm, sample_rate, channels, sample_width);
        RelayEnvelope::Audio {
            format: WAV_FORMAT.to_string(),
            data: BASE64_STANDARD.encode(wav),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RelayEnvelope::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
