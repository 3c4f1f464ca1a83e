//! A single relay session.
//!
//! A session owns one upstream connection and four pipeline stages:
//!
//! - **sender** drains the outbound queue into the upstream stream
//! - **receiver** reads upstream turns and queues audio payloads
//! - **broadcaster** frames queued payloads as WAV and fans them out
//! - **ingest** keeps the push-style ingest path alive (no-op when serverless)
//!
//! Stages run as separate tasks under [`Session::run`]. Each races its blocking
//! await against a child of the session shutdown token, so [`Session::stop`]
//! and fatal stage errors end every stage promptly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::base::{RelayError, RelayResult, SessionConfig, SessionState};
use super::envelope::RelayEnvelope;
use super::subscribers::SubscriberRegistry;
use crate::core::audio::AudioChunk;
use crate::core::upstream::{LiveStream, SharedLiveClient, UpstreamResult};

pub struct Session {
    id: String,
    config: SessionConfig,
    client: SharedLiveClient,
    subscribers: Arc<SubscriberRegistry>,

    connection: Mutex<Option<Arc<dyn LiveStream>>>,
    running: AtomicBool,
    retries: AtomicU32,
    state: watch::Sender<SessionState>,

    outbound_tx: mpsc::Sender<AudioChunk>,
    outbound_rx: AsyncMutex<mpsc::Receiver<AudioChunk>>,
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Bytes>>,
    inbound_pending: AtomicUsize,

    shutdown: CancellationToken,
    stop_guard: AsyncMutex<()>,
    fatal: Mutex<Option<String>>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        client: SharedLiveClient,
        subscribers: Arc<SubscriberRegistry>,
    ) -> RelayResult<Self> {
        config.validate()?;

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Idle);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            config,
            client,
            subscribers,
            connection: Mutex::new(None),
            running: AtomicBool::new(false),
            retries: AtomicU32::new(0),
            state,
            outbound_tx,
            outbound_rx: AsyncMutex::new(outbound_rx),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            inbound_pending: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            stop_guard: AsyncMutex::new(()),
            fatal: Mutex::new(None),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Failed connect attempts so far.
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Chunks waiting to be sent upstream.
    pub fn outbound_len(&self) -> usize {
        self.outbound_tx.max_capacity() - self.outbound_tx.capacity()
    }

    /// Payloads waiting to be broadcast.
    pub fn inbound_len(&self) -> usize {
        self.inbound_pending.load(Ordering::Relaxed)
    }

    pub fn has_connection(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(session_id = %self.id, from = %previous, to = %state, "Session state changed");
        }
    }

    fn current_connection(&self) -> Option<Arc<dyn LiveStream>> {
        self.connection.lock().clone()
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Establish the upstream connection, retrying up to `max_retries` times.
    pub async fn connect(&self) -> RelayResult<()> {
        let current = self.state();
        if current != SessionState::Idle {
            return Err(RelayError::InvalidState(format!(
                "cannot connect a session in state {current}"
            )));
        }
        self.set_state(SessionState::Connecting);

        let attempts = self.config.max_retries;
        let timing = &self.config.timing;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!(
                session_id = %self.id,
                attempt,
                max_attempts = attempts,
                model = %self.config.model,
                provider = self.client.provider_name(),
                "Connecting to upstream"
            );

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(self.stopped_while_connecting()),
                outcome = tokio::time::timeout(
                    timing.connect_timeout,
                    self.client.connect_stream(&self.config.model, &self.config.connect),
                ) => outcome,
            };

            match outcome {
                Ok(Ok(stream)) => return self.install_connection(stream).await,
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("connect timed out after {:?}", timing.connect_timeout)
                }
            }

            self.retries.fetch_add(1, Ordering::Relaxed);
            warn!(session_id = %self.id, attempt, error = %last_error, "Upstream connect attempt failed");

            if attempt < attempts && !self.pause(&self.shutdown, timing.retry_delay).await {
                return Err(self.stopped_while_connecting());
            }
        }

        error!(session_id = %self.id, attempts, "Giving up on upstream connection");
        self.set_state(SessionState::Failed);
        Err(RelayError::ConnectionFailure {
            attempts,
            reason: last_error,
        })
    }

    async fn install_connection(&self, stream: Arc<dyn LiveStream>) -> RelayResult<()> {
        if self.shutdown.is_cancelled() {
            if let Err(e) = stream.close().await {
                debug!(session_id = %self.id, error = %e, "Error closing late connection");
            }
            return Err(self.stopped_while_connecting());
        }

        *self.connection.lock() = Some(stream);
        self.running.store(true, Ordering::Release);
        self.set_state(SessionState::Running);
        info!(session_id = %self.id, "Session connected");
        Ok(())
    }

    fn stopped_while_connecting(&self) -> RelayError {
        RelayError::InvalidState("session stopped while connecting".to_string())
    }

    // =========================================================================
    // Ingest
    // =========================================================================

    /// Queue a chunk for the upstream. Waits while the outbound queue is full.
    pub async fn submit(&self, chunk: AudioChunk) -> RelayResult<()> {
        if !self.is_running() {
            return Err(RelayError::NotRunning);
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(RelayError::NotRunning),
            sent = self.outbound_tx.send(chunk) => sent.map_err(|_| RelayError::NotRunning),
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn sender_stage(self: Arc<Self>, cancel: CancellationToken) {
        let mut outbound = self.outbound_rx.lock().await;
        debug!(session_id = %self.id, "Sender stage started");

        while self.is_running() {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = outbound.recv() => match next {
                    Some(chunk) => chunk,
                    None => break,
                },
            };

            let Some(connection) = self.current_connection() else {
                break;
            };

            let bytes = chunk.len();
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = connection.send(chunk) => sent,
            };

            match sent {
                Ok(()) => trace!(session_id = %self.id, bytes, "Forwarded chunk upstream"),
                Err(e) => {
                    error!(session_id = %self.id, error = %e, "Failed to send audio upstream");
                    self.fail(format!("send failed: {e}"));
                    break;
                }
            }
        }

        debug!(session_id = %self.id, "Sender stage finished");
    }

    async fn receiver_stage(self: Arc<Self>, cancel: CancellationToken) {
        debug!(session_id = %self.id, "Receiver stage started");
        let timing = &self.config.timing;

        while self.is_running() {
            let Some(connection) = self.current_connection() else {
                break;
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.drain_turn(connection.as_ref()) => outcome,
            };

            let keep_going = match outcome {
                Ok(0) => self.pause(&cancel, timing.poll_interval).await,
                Ok(payloads) => {
                    debug!(session_id = %self.id, payloads, "Turn complete");
                    true
                }
                Err(e) if e.is_transient() => {
                    let err = RelayError::TransientStream(e.to_string());
                    warn!(session_id = %self.id, error = %err, "Retrying receive");
                    self.pause(&cancel, timing.transient_pause).await
                }
                Err(e) => {
                    error!(session_id = %self.id, error = %e, "Failed to receive from upstream");
                    self.fail(format!("receive failed: {e}"));
                    false
                }
            };

            if !keep_going {
                break;
            }
        }

        debug!(session_id = %self.id, "Receiver stage finished");
    }

    /// Read one turn, queueing every non-empty audio payload.
    async fn drain_turn(&self, connection: &dyn LiveStream) -> UpstreamResult<usize> {
        let mut turn = connection.receive();
        let mut payloads = 0;

        while let Some(response) = turn.next().await {
            let response = response?;
            if let Some(data) = response.audio_payload() {
                if self.inbound_tx.send(data.clone()).is_err() {
                    break;
                }
                self.inbound_pending.fetch_add(1, Ordering::Relaxed);
                payloads += 1;
            }
        }

        Ok(payloads)
    }

    async fn broadcaster_stage(self: Arc<Self>, cancel: CancellationToken) {
        let mut inbound = self.inbound_rx.lock().await;
        debug!(session_id = %self.id, "Broadcaster stage started");

        let sample_rate = self.config.output_sample_rate();
        let channels = self.config.output_channels();
        let sample_width = self.config.output_sample_width();

        while self.is_running() {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = inbound.recv() => match next {
                    Some(payload) => payload,
                    None => break,
                },
            };
            self.inbound_pending.fetch_sub(1, Ordering::Relaxed);

            let envelope = RelayEnvelope::wav_audio(&payload, sample_rate, channels, sample_width);
            let message = match envelope.to_json() {
                Ok(message) => message,
                Err(e) => {
                    error!(session_id = %self.id, error = %e, "Failed to encode audio envelope");
                    continue;
                }
            };

            let report = self.subscribers.broadcast(&message).await;
            trace!(
                session_id = %self.id,
                bytes = payload.len(),
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast audio"
            );
        }

        debug!(session_id = %self.id, "Broadcaster stage finished");
    }

    async fn ingest_stage(self: Arc<Self>, cancel: CancellationToken) {
        if self.config.serverless {
            debug!(session_id = %self.id, "Serverless mode, ingest keepalive disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.config.timing.keepalive_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.is_running() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    trace!(
                        session_id = %self.id,
                        outbound = self.outbound_len(),
                        inbound = self.inbound_len(),
                        "Ingest keepalive"
                    );
                }
            }
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Record a stage failure and bring the session down.
    fn fail(&self, reason: String) {
        self.fatal.lock().get_or_insert(reason);
        self.running.store(false, Ordering::Release);
        self.shutdown.cancel();
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Ask a running session to wind down. `run` performs the cleanup.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.cancel();
    }

    /// Stop the session and release its connection. Idempotent.
    pub async fn stop(&self) -> RelayResult<()> {
        let _guard = self.stop_guard.lock().await;

        let current = self.state();
        if current.is_terminal() && !self.has_connection() {
            return Ok(());
        }

        info!(session_id = %self.id, state = %current, "Stopping session");
        self.running.store(false, Ordering::Release);
        if current != SessionState::Failed {
            self.set_state(SessionState::Stopping);
        }
        self.shutdown.cancel();

        tokio::time::sleep(self.config.timing.stop_grace).await;

        let connection = self.connection.lock().take();
        if let Some(connection) = connection
            && let Err(e) = connection.close().await
        {
            warn!(session_id = %self.id, error = %e, "Error closing upstream connection");
        }

        let (dropped_out, dropped_in) = self.drain_queues().await;
        if dropped_out + dropped_in > 0 {
            debug!(
                session_id = %self.id,
                outbound = dropped_out,
                inbound = dropped_in,
                "Discarded queued audio"
            );
        }

        if current != SessionState::Failed {
            self.set_state(SessionState::Closed);
        }
        info!(session_id = %self.id, "Session stopped");
        Ok(())
    }

    async fn drain_queues(&self) -> (usize, usize) {
        let mut outbound = 0;
        {
            let mut rx = self.outbound_rx.lock().await;
            while rx.try_recv().is_ok() {
                outbound += 1;
            }
        }

        let mut inbound = 0;
        {
            let mut rx = self.inbound_rx.lock().await;
            while rx.try_recv().is_ok() {
                inbound += 1;
            }
        }
        self.inbound_pending.store(0, Ordering::Relaxed);

        (outbound, inbound)
    }

    /// Connect, run every stage until shutdown, then stop.
    ///
    /// Returns `Ok` when stopped externally and `FatalStream` when a stage
    /// failure ended the session.
    pub async fn run(self: Arc<Self>) -> RelayResult<()> {
        if let Err(e) = self.connect().await {
            self.stop().await?;
            return Err(e);
        }

        let mut stages = JoinSet::new();
        stages.spawn(self.clone().sender_stage(self.shutdown.child_token()));
        stages.spawn(self.clone().receiver_stage(self.shutdown.child_token()));
        stages.spawn(self.clone().broadcaster_stage(self.shutdown.child_token()));
        stages.spawn(self.clone().ingest_stage(self.shutdown.child_token()));
        info!(session_id = %self.id, "Session running");

        self.shutdown.cancelled().await;

        let join_timeout = self.config.timing.join_timeout;
        let joined = tokio::time::timeout(join_timeout, async {
            while let Some(result) = stages.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(session_id = %self.id, error = %e, "Session stage panicked");
                    } else {
                        debug!(session_id = %self.id, error = %e, "Session stage cancelled");
                    }
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(session_id = %self.id, "Stages did not finish in time, aborting");
            stages.abort_all();
        }

        self.stop().await?;

        match self.fatal.lock().clone() {
            Some(reason) => Err(RelayError::FatalStream(reason)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::base::SessionTiming;
    use crate::core::upstream::{
        LiveClient, LiveConnectConfig, LiveResponse, TurnStream, UpstreamError,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct SilentStream;

    #[async_trait]
    impl LiveStream for SilentStream {
        async fn send(&self, _chunk: AudioChunk) -> UpstreamResult<()> {
            Ok(())
        }

        fn receive(&self) -> TurnStream<'_> {
            Box::pin(futures::stream::pending::<UpstreamResult<LiveResponse>>())
        }

        async fn close(&self) -> UpstreamResult<()> {
            Ok(())
        }
    }

    struct FlakyClient {
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl LiveClient for FlakyClient {
        async fn connect_stream(
            &self,
            _model: &str,
            _config: &LiveConnectConfig,
        ) -> UpstreamResult<Arc<dyn LiveStream>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures_before_success {
                Err(UpstreamError::ConnectionFailed("refused".to_string()))
            } else {
                Ok(Arc::new(SilentStream))
            }
        }

        fn provider_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            timing: SessionTiming {
                retry_delay: Duration::from_millis(5),
                stop_grace: Duration::from_millis(5),
                keepalive_interval: Duration::from_millis(5),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn session_with(failures: u32) -> (Arc<FlakyClient>, Session) {
        let client = Arc::new(FlakyClient {
            failures_before_success: failures,
            attempts: AtomicU32::new(0),
        });
        let session = Session::new(
            fast_config(),
            client.clone(),
            Arc::new(SubscriberRegistry::new()),
        )
        .unwrap();
        (client, session)
    }

    #[tokio::test]
    async fn test_connect_succeeds_after_retries() {
        let (client, session) = session_with(2);
        session.connect().await.unwrap();

        assert_eq!(client.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(session.retry_count(), 2);
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.is_running());
        assert!(session.has_connection());
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_budget() {
        let (client, session) = session_with(u32::MAX);
        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, RelayError::ConnectionFailure { attempts: 3, .. }));
        assert_eq!(client.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (client, session) = session_with(0);
        session.connect().await.unwrap();

        assert!(matches!(
            session.connect().await,
            Err(RelayError::InvalidState(_))
        ));
        assert_eq!(client.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_requires_running() {
        let (_client, session) = session_with(0);
        assert_eq!(
            session.submit(AudioChunk::pcm(vec![1u8])).await,
            Err(RelayError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_stop_before_connect_and_twice() {
        let (_client, session) = session_with(0);
        session.stop().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(
            session.connect().await,
            Err(RelayError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_drains_outbound_queue() {
        let (_client, session) = session_with(0);
        session.connect().await.unwrap();

        for i in 0..5u8 {
            session.submit(AudioChunk::pcm(vec![i])).await.unwrap();
        }
        assert_eq!(session.outbound_len(), 5);

        session.stop().await.unwrap();
        assert_eq!(session.outbound_len(), 0);
        assert!(!session.has_connection());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_run_returns_ok_on_request_stop() {
        let (_client, session) = session_with(0);
        let session = Arc::new(session);
        let mut states = session.subscribe_state();

        let worker = tokio::spawn(session.clone().run());
        states
            .wait_for(|s| *s == SessionState::Running)
            .await
            .unwrap();

        session.request_stop();
        assert_eq!(worker.await.unwrap(), Ok(()));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            outbound_queue_capacity: 0,
            ..Default::default()
        };
        let client = Arc::new(FlakyClient {
            failures_before_success: 0,
            attempts: AtomicU32::new(0),
        });
        assert!(Session::new(config, client, Arc::new(SubscriberRegistry::new())).is_err());
    }
}
