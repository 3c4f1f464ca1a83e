pub mod audio;
pub mod session;
pub mod upstream;

// Re-export commonly used types for convenience
pub use audio::{AudioChunk, create_header, create_wav};

pub use session::{
    AudioSink, RelayEnvelope, RelayError, RelayResult, Session, SessionConfig, SessionManager,
    SessionState, SessionStatus, SessionTiming, SubscriberRegistry,
};

pub use upstream::{
    GeminiLiveClient, LiveClient, LiveConnectConfig, LiveProvider, LiveResponse, LiveStream,
    SharedLiveClient, UpstreamError, UpstreamResult, create_live_client, get_supported_providers,
};
