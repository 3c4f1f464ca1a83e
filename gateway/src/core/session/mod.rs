//! Session lifecycle and streaming engine.
//!
//! - `session` - one upstream connection and its send/receive/broadcast stages
//! - `manager` - at most one active session per process
//! - `subscribers` - weakly-held output sinks
//! - `envelope` - JSON messages delivered to subscribers

mod base;
pub mod envelope;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod session;
pub mod subscribers;

pub use base::{RelayError, RelayResult, SessionConfig, SessionState, SessionStatus, SessionTiming};
pub use envelope::{RelayEnvelope, WAV_FORMAT};
pub use manager::SessionManager;
pub use session::Session;
pub use subscribers::{AudioSink, BroadcastReport, SubscriberId, SubscriberRegistry};
