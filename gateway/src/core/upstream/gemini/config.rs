//! Gemini Live API configuration types.

use serde::{Deserialize, Serialize};

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default Gemini Live model.
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Sample rate of PCM produced by Gemini Live (Hz).
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Prefix Gemini expects on fully-qualified model names.
const MODEL_PREFIX: &str = "models/";

/// Qualify a model name with the `models/` prefix if it is missing.
pub fn normalize_model_name(model: &str) -> String {
    let model = model.trim();
    if model.is_empty() {
        DEFAULT_GEMINI_MODEL.to_string()
    } else if model.starts_with(MODEL_PREFIX) {
        model.to_string()
    } else {
        format!("{MODEL_PREFIX}{model}")
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices available to Gemini Live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiVoice {
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    Zephyr,
}

impl GeminiVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "puck" => Self::Puck,
            "charon" => Self::Charon,
            "kore" => Self::Kore,
            "fenrir" => Self::Fenrir,
            "aoede" => Self::Aoede,
            "leda" => Self::Leda,
            "orus" => Self::Orus,
            "zephyr" => Self::Zephyr,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(
            normalize_model_name("gemini-2.0-flash-live-001"),
            "models/gemini-2.0-flash-live-001"
        );
        assert_eq!(
            normalize_model_name("models/gemini-2.0-flash-live-001"),
            "models/gemini-2.0-flash-live-001"
        );
        assert_eq!(normalize_model_name("  "), DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_voice_parsing() {
        assert_eq!(GeminiVoice::from_str_or_default("kore"), GeminiVoice::Kore);
        assert_eq!(GeminiVoice::from_str_or_default("AOEDE"), GeminiVoice::Aoede);
        assert_eq!(GeminiVoice::from_str_or_default("unknown"), GeminiVoice::Puck);
        assert_eq!(GeminiVoice::Charon.to_string(), "Charon");
    }
}
