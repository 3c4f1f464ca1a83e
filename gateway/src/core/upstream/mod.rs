//! Upstream live-conversation providers.
//!
//! The session engine only sees [`LiveClient`] and [`LiveStream`]; concrete
//! providers are created through [`create_live_client`].

mod base;
pub mod gemini;

pub use base::{
    LiveClient, LiveConnectConfig, LiveResponse, LiveStream, SharedLiveClient, TurnStream,
    UpstreamError, UpstreamResult,
};
pub use gemini::{DEFAULT_GEMINI_MODEL, GeminiLiveClient, GeminiVoice};

use std::sync::Arc;

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveProvider {
    /// Google Gemini Live API
    Gemini,
}

impl LiveProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "gemini-live" | "google" => Some(LiveProvider::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for LiveProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Create a live client for `provider`.
pub fn create_live_client(provider: &str, api_key: &str) -> UpstreamResult<SharedLiveClient> {
    match LiveProvider::parse(provider) {
        Some(LiveProvider::Gemini) => Ok(Arc::new(GeminiLiveClient::new(api_key)?)),
        None => Err(UpstreamError::InvalidConfiguration(format!(
            "Unsupported upstream provider: {provider}"
        ))),
    }
}

/// Get list of supported upstream providers.
pub fn get_supported_providers() -> Vec<&'static str> {
    vec!["gemini"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_live_client() {
        let client = create_live_client("gemini", "test_key").unwrap();
        assert_eq!(client.provider_name(), "gemini");

        assert!(create_live_client("GEMINI", "test_key").is_ok());
        assert!(create_live_client("openai", "test_key").is_err());
    }

    #[test]
    fn test_create_live_client_requires_key() {
        assert!(matches!(
            create_live_client("gemini", ""),
            Err(UpstreamError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(LiveProvider::parse("gemini"), Some(LiveProvider::Gemini));
        assert_eq!(LiveProvider::parse("Google"), Some(LiveProvider::Gemini));
        assert_eq!(LiveProvider::parse("hume"), None);
        assert_eq!(LiveProvider::Gemini.to_string(), "gemini");
    }

    #[test]
    fn test_get_supported_providers() {
        assert_eq!(get_supported_providers(), vec!["gemini"]);
    }
}
