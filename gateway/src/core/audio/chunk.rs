use bytes::Bytes;

/// Format tag assumed for audio submitted without one.
pub const DEFAULT_AUDIO_FORMAT: &str = "audio/pcm";

/// A unit of audio travelling through the relay.
///
/// Produced by the transport (outbound) or by the upstream connection
/// (inbound). Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw audio bytes
    pub data: Bytes,
    /// Format tag (e.g., "audio/pcm", "pcm16")
    pub format: String,
}

impl AudioChunk {
    pub fn new(data: impl Into<Bytes>, format: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            format: format.into(),
        }
    }

    /// Raw PCM with the default format tag.
    pub fn pcm(data: impl Into<Bytes>) -> Self {
        Self::new(data, DEFAULT_AUDIO_FORMAT)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
