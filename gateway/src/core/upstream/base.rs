//! Base traits and types for upstream live-conversation providers.
//!
//! The relay treats the provider as an opaque bidirectional stream: it
//! connects once per session, pushes audio chunks in, and reads responses one
//! turn at a time. Provider specifics (wire protocol, auth, setup handshake)
//! stay behind [`LiveClient`] and [`LiveStream`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::audio::AudioChunk;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by an upstream provider connection.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The provider closed the stream
    #[error("Stream closed: {0}")]
    Closed(String),

    /// The provider sent something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl UpstreamError {
    /// Whether the error is timeout-flavoured and worth a brief pause and retry.
    ///
    /// Providers do not always surface timeouts as a distinct variant, so the
    /// error text is inspected as well.
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
            || self.to_string().to_lowercase().contains("timeout")
    }
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Provider-agnostic parameters for opening a live stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConnectConfig {
    /// Prebuilt voice used for speech synthesis
    pub voice_name: String,

    /// System instruction for the assistant
    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Response modalities requested from the provider
    #[serde(default = "default_modalities")]
    pub response_modalities: Vec<String>,

    /// Sample rate of audio we send (Hz)
    pub input_sample_rate: u32,

    /// Sample rate of audio we expect back (Hz)
    pub output_sample_rate: u32,
}

fn default_modalities() -> Vec<String> {
    vec!["AUDIO".to_string()]
}

impl Default for LiveConnectConfig {
    fn default() -> Self {
        Self {
            voice_name: "Puck".to_string(),
            system_instruction: None,
            response_modalities: default_modalities(),
            input_sample_rate: crate::core::audio::SEND_SAMPLE_RATE,
            output_sample_rate: crate::core::audio::RECEIVE_SAMPLE_RATE,
        }
    }
}

// =============================================================================
// Response Units
// =============================================================================

/// One unit read from the provider within a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveResponse {
    /// Raw PCM audio, if this unit carried any
    pub data: Option<Bytes>,
    /// Text content, if this unit carried any
    pub text: Option<String>,
    /// Set on the unit that completes the turn
    pub turn_complete: bool,
}

impl LiveResponse {
    pub fn audio(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn turn_complete() -> Self {
        Self {
            turn_complete: true,
            ..Default::default()
        }
    }

    /// Audio payload if present and non-empty.
    pub fn audio_payload(&self) -> Option<&Bytes> {
        self.data.as_ref().filter(|d| !d.is_empty())
    }
}

/// Stream of response units making up a single turn.
///
/// The stream ends once the provider signals turn completion.
pub type TurnStream<'a> = BoxStream<'a, UpstreamResult<LiveResponse>>;

// =============================================================================
// Base Traits
// =============================================================================

/// An open bidirectional stream to the provider.
///
/// Methods take `&self` so the sender and receiver stages can drive the same
/// connection concurrently.
#[async_trait]
pub trait LiveStream: Send + Sync {
    /// Push one audio chunk to the provider.
    async fn send(&self, chunk: AudioChunk) -> UpstreamResult<()>;

    /// Read the next turn as a stream of response units.
    fn receive(&self) -> TurnStream<'_>;

    /// Close the stream. Calling it more than once is harmless.
    async fn close(&self) -> UpstreamResult<()>;
}

/// Factory capability for opening live streams.
#[async_trait]
pub trait LiveClient: Send + Sync {
    /// Open a new stream for `model`.
    async fn connect_stream(
        &self,
        model: &str,
        config: &LiveConnectConfig,
    ) -> UpstreamResult<Arc<dyn LiveStream>>;

    /// Provider name for logs and status.
    fn provider_name(&self) -> &'static str;
}

/// Shared handle to a live client.
pub type SharedLiveClient = Arc<dyn LiveClient>;
