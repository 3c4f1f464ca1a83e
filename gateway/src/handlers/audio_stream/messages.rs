//! Audio stream WebSocket message types

use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming JSON messages from an audio client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncomingMessage {
    /// Base64 audio for the upstream
    Audio {
        /// Format tag, defaults to raw PCM
        #[serde(default)]
        format: Option<String>,
        /// Base64-encoded audio bytes
        data: String,
    },

    /// Session control
    Control { command: ControlCommand },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Start,
    Stop,
}

// =============================================================================
// Message Routing
// =============================================================================

/// Work items for the per-connection sender task
#[derive(Debug)]
pub enum MessageRoute {
    /// Serialised JSON text frame
    Outgoing(String),
    /// Close the connection
    Close,
}
