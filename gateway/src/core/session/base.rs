//! Session configuration, lifecycle states and errors.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::core::audio::{CHANNELS, RECEIVE_SAMPLE_RATE, SAMPLE_WIDTH};
use crate::core::upstream::{DEFAULT_GEMINI_MODEL, LiveConnectConfig};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the session engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Every connect attempt failed
    #[error("Failed to connect after {attempts} attempts: {reason}")]
    ConnectionFailure { attempts: u32, reason: String },

    /// Timeout-flavoured stream error, recovered locally
    #[error("Transient stream error: {0}")]
    TransientStream(String),

    /// Stream error that ended the session
    #[error("Stream failed: {0}")]
    FatalStream(String),

    /// Delivery to a single subscriber failed
    #[error("Subscriber delivery failed: {0}")]
    SubscriberDelivery(String),

    /// No session is running
    #[error("No session is running")]
    NotRunning,

    /// Operation not valid in the current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for session operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Lifecycle
// =============================================================================

/// Session lifecycle states.
///
/// `Idle -> Connecting -> Running -> Stopping -> Closed`, or
/// `Connecting -> Failed` when the connect budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Running,
    Stopping,
    Closed,
    Failed,
}

impl SessionState {
    /// Closed and Failed sessions cannot be reused.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot reported by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub state: SessionState,
    pub session_id: Option<String>,
    pub subscribers: usize,
    /// Whether sessions run without the ingest keepalive
    pub serverless: bool,
}

// =============================================================================
// Configuration
// =============================================================================

/// Delays and bounds used by the session engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTiming {
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Pause between failed connect attempts
    pub retry_delay: Duration,
    /// Pause after a timeout-flavoured receive error
    pub transient_pause: Duration,
    /// Pause after a turn that produced no audio
    pub poll_interval: Duration,
    /// Heartbeat period of the ingest stage
    pub keepalive_interval: Duration,
    /// Time given to stages to observe shutdown before the connection closes
    pub stop_grace: Duration,
    /// Bound on waiting for a session worker when replacing or terminating
    pub join_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
            transient_pause: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            keepalive_interval: Duration::from_millis(500),
            stop_grace: Duration::from_millis(500),
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything a session needs to connect and relay.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upstream model identifier
    pub model: String,
    /// Provider-agnostic connect parameters (voice, instruction, rates)
    pub connect: LiveConnectConfig,
    /// Connect attempts before giving up
    pub max_retries: u32,
    /// Outbound queue bound; producers wait when it is full
    pub outbound_queue_capacity: usize,
    /// Skip the ingest keepalive stage
    pub serverless: bool,
    pub timing: SessionTiming,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            connect: LiveConnectConfig::default(),
            max_retries: 3,
            outbound_queue_capacity: 64,
            serverless: false,
            timing: SessionTiming::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> RelayResult<()> {
        if self.model.trim().is_empty() {
            return Err(RelayError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(RelayError::InvalidConfiguration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(RelayError::InvalidConfiguration(
                "outbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sample rate used to frame broadcast audio.
    pub fn output_sample_rate(&self) -> u32 {
        if self.connect.output_sample_rate == 0 {
            RECEIVE_SAMPLE_RATE
        } else {
            self.connect.output_sample_rate
        }
    }

    pub fn output_channels(&self) -> u16 {
        CHANNELS
    }

    pub fn output_sample_width(&self) -> u16 {
        SAMPLE_WIDTH
    }
}
