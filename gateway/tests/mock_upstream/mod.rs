//! Scriptable in-process upstream used by the integration tests.
//!
//! A [`MockUpstream`] hands out streams that record every chunk sent to them
//! and replay scripted turns on `receive`. When no turn is scripted the
//! stream yields an empty turn, which the receiver treats as an idle poll.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use voice_relay::core::session::{AudioSink, RelayError, RelayResult, SessionConfig, SessionTiming};
use voice_relay::core::upstream::{
    LiveClient, LiveConnectConfig, LiveResponse, LiveStream, TurnStream, UpstreamError,
    UpstreamResult,
};
use voice_relay::AudioChunk;

type Turn = Vec<UpstreamResult<LiveResponse>>;

#[derive(Default)]
struct MockState {
    failing_connects: AtomicU32,
    connect_attempts: AtomicU32,
    open_streams: AtomicUsize,
    closed_streams: AtomicUsize,
    sent: Mutex<Vec<AudioChunk>>,
    turns: Mutex<VecDeque<Turn>>,
    send_error: Mutex<Option<UpstreamError>>,
}

/// Handle to a mock provider. Clones share the same script and recordings.
#[derive(Clone, Default)]
pub struct MockUpstream {
    state: Arc<MockState>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts.
    pub fn fail_connects(self, n: u32) -> Self {
        self.state.failing_connects.store(n, Ordering::SeqCst);
        self
    }

    /// Refuse every connect attempt.
    pub fn unreachable(self) -> Self {
        self.fail_connects(u32::MAX)
    }

    pub fn client(&self) -> Arc<dyn LiveClient> {
        Arc::new(MockClient {
            state: self.state.clone(),
        })
    }

    /// Queue a turn of audio payloads followed by turn completion.
    pub fn push_audio_turn(&self, payloads: &[&[u8]]) {
        let mut turn: Turn = payloads
            .iter()
            .map(|p| Ok(LiveResponse::audio(p.to_vec())))
            .collect();
        turn.push(Ok(LiveResponse::turn_complete()));
        self.state.turns.lock().push_back(turn);
    }

    /// Queue a turn that fails with `error`.
    pub fn push_error_turn(&self, error: UpstreamError) {
        self.state.turns.lock().push_back(vec![Err(error)]);
    }

    /// Make every subsequent `send` fail.
    pub fn fail_sends(&self, error: UpstreamError) {
        *self.state.send_error.lock() = Some(error);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.state.open_streams.load(Ordering::SeqCst)
    }

    pub fn closed_streams(&self) -> usize {
        self.state.closed_streams.load(Ordering::SeqCst)
    }

    /// Sizes of the chunks received, in arrival order.
    pub fn sent_sizes(&self) -> Vec<usize> {
        self.state.sent.lock().iter().map(AudioChunk::len).collect()
    }

    pub fn sent(&self) -> Vec<AudioChunk> {
        self.state.sent.lock().clone()
    }
}

struct MockClient {
    state: Arc<MockState>,
}

#[async_trait]
impl LiveClient for MockClient {
    async fn connect_stream(
        &self,
        _model: &str,
        _config: &LiveConnectConfig,
    ) -> UpstreamResult<Arc<dyn LiveStream>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.state.failing_connects.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(UpstreamError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        self.state.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockStream {
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

struct MockStream {
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait]
impl LiveStream for MockStream {
    async fn send(&self, chunk: AudioChunk) -> UpstreamResult<()> {
        if let Some(err) = self.state.send_error.lock().clone() {
            return Err(err);
        }
        self.state.sent.lock().push(chunk);
        Ok(())
    }

    fn receive(&self) -> TurnStream<'_> {
        let turn = self.state.turns.lock().pop_front().unwrap_or_default();
        Box::pin(futures::stream::iter(turn))
    }

    async fn close(&self) -> UpstreamResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.open_streams.fetch_sub(1, Ordering::SeqCst);
            self.state.closed_streams.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// =============================================================================
// Subscribers
// =============================================================================

/// Sink that keeps every message it receives.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn send(&self, message: &str) -> RelayResult<()> {
        self.messages.lock().push(message.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Sink whose every delivery fails.
pub struct BrokenSink;

#[async_trait]
impl AudioSink for BrokenSink {
    async fn send(&self, _message: &str) -> RelayResult<()> {
        Err(RelayError::SubscriberDelivery("peer went away".to_string()))
    }

    async fn close(&self) {}
}

// =============================================================================
// Helpers
// =============================================================================

/// Session configuration with short timings.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        timing: SessionTiming {
            retry_delay: Duration::from_millis(5),
            transient_pause: Duration::from_millis(5),
            poll_interval: Duration::from_millis(2),
            keepalive_interval: Duration::from_millis(5),
            stop_grace: Duration::from_millis(5),
            join_timeout: Duration::from_millis(500),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
