//! Gemini Live wire messages.
//!
//! Client messages are externally tagged JSON objects (`{"setup": {...}}`,
//! `{"realtimeInput": {...}}`). Server messages carry optional top-level
//! fields; only the ones the relay acts on are modelled.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::config::{GeminiVoice, normalize_model_name};
use crate::core::audio::AudioChunk;
use crate::core::upstream::base::{LiveConnectConfig, LiveResponse, UpstreamError, UpstreamResult};

// =============================================================================
// Client Messages (sent to server)
// =============================================================================

/// Messages sent from the relay to Gemini.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on a new connection
    Setup(Setup),
    /// Streaming media input
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

/// Inline binary payload, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl ClientMessage {
    /// Build the setup message for a new session.
    pub fn setup(model: &str, config: &LiveConnectConfig) -> Self {
        let voice = GeminiVoice::from_str_or_default(&config.voice_name);

        ClientMessage::Setup(Setup {
            model: normalize_model_name(model),
            generation_config: GenerationConfig {
                response_modalities: config.response_modalities.clone(),
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.as_str().to_string(),
                        },
                    },
                },
            },
            system_instruction: config.system_instruction.as_ref().map(|text| Content {
                parts: vec![Part {
                    text: Some(text.clone()),
                    inline_data: None,
                }],
                role: Some("user".to_string()),
            }),
        })
    }

    /// Wrap an audio chunk as realtime input.
    pub fn realtime_audio(chunk: &AudioChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: mime_type_for(&chunk.format),
                data: BASE64_STANDARD.encode(&chunk.data),
            }],
        })
    }
}

/// Map a relay format tag to the MIME type Gemini expects.
fn mime_type_for(format: &str) -> String {
    if format.contains('/') {
        format.to_string()
    } else {
        "audio/pcm".to_string()
    }
}

// =============================================================================
// Server Messages (received from server)
// =============================================================================

/// Messages received from Gemini.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }
}

impl ServerContent {
    /// Convert the content into response units, decoding inline audio.
    ///
    /// A completed turn is terminated with a `turn_complete` marker unit.
    pub fn into_responses(self) -> UpstreamResult<Vec<LiveResponse>> {
        let mut responses = Vec::new();

        if let Some(turn) = self.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    let audio = BASE64_STANDARD.decode(blob.data.as_bytes()).map_err(|e| {
                        UpstreamError::Protocol(format!("invalid inline audio: {e}"))
                    })?;
                    responses.push(LiveResponse::audio(Bytes::from(audio)));
                }
                if let Some(text) = part.text {
                    responses.push(LiveResponse {
                        text: Some(text),
                        ..Default::default()
                    });
                }
            }
        }

        if self.turn_complete {
            responses.push(LiveResponse::turn_complete());
        }

        Ok(responses)
    }
}
