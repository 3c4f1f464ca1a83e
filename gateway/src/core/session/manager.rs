//! Process-wide coordinator of the single active session.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::base::{RelayError, RelayResult, SessionConfig, SessionState, SessionStatus};
use super::session::Session;
use super::subscribers::{AudioSink, SubscriberId, SubscriberRegistry};
use crate::core::audio::AudioChunk;
use crate::core::upstream::SharedLiveClient;

struct ActiveSession {
    session: Arc<Session>,
    worker: JoinHandle<RelayResult<()>>,
}

/// Owns at most one live [`Session`] and the subscriber registry.
///
/// Lifecycle changes (start, replace, stop) are serialised by an async guard.
/// Status reads and audio ingest go through a lock-free mirror of the active
/// session and never wait on a lifecycle change.
pub struct SessionManager {
    client: SharedLiveClient,
    defaults: SessionConfig,
    subscribers: Arc<SubscriberRegistry>,
    active: Mutex<Option<ActiveSession>>,
    current: ArcSwapOption<Session>,
}

impl SessionManager {
    pub fn new(client: SharedLiveClient, defaults: SessionConfig) -> Self {
        Self {
            client,
            defaults,
            subscribers: Arc::new(SubscriberRegistry::new()),
            active: Mutex::new(None),
            current: ArcSwapOption::empty(),
        }
    }

    pub fn default_config(&self) -> &SessionConfig {
        &self.defaults
    }

    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    /// The active session, if any.
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Replace any active session with a new one built from `config`.
    ///
    /// Returns once the new session is running or has failed to connect.
    pub async fn start(&self, config: SessionConfig) -> RelayResult<SessionStatus> {
        let mut slot = self.active.lock().await;
        self.start_locked(&mut slot, config).await
    }

    /// [`start`](Self::start) with the default configuration.
    pub async fn start_default(&self) -> RelayResult<SessionStatus> {
        self.start(self.defaults.clone()).await
    }

    /// Start a session only if none is running.
    pub async fn ensure_started(&self) -> RelayResult<SessionStatus> {
        let mut slot = self.active.lock().await;
        if let Some(active) = slot.as_ref()
            && active.session.is_running()
        {
            return Ok(self.status_of(Some(&active.session)));
        }
        self.start_locked(&mut slot, self.defaults.clone()).await
    }

    async fn start_locked(
        &self,
        slot: &mut Option<ActiveSession>,
        config: SessionConfig,
    ) -> RelayResult<SessionStatus> {
        if let Some(previous) = slot.take() {
            info!(session_id = %previous.session.id(), "Replacing active session");
            self.current.store(None);
            self.shutdown_active(previous).await;
        }

        let session = Arc::new(Session::new(
            config,
            self.client.clone(),
            self.subscribers.clone(),
        )?);
        let mut states = session.subscribe_state();

        let mut worker = {
            let session = session.clone();
            tokio::spawn(async move {
                let result = session.clone().run().await;
                match &result {
                    Ok(()) => info!(session_id = %session.id(), "Session ended"),
                    Err(e) => error!(session_id = %session.id(), error = %e, "Session ended with error"),
                }
                result
            })
        };

        // A worker that dies while connecting never moves the state on, so
        // its completion is watched as well.
        let settled = tokio::select! {
            settled = async {
                states
                    .wait_for(|state| {
                        !matches!(state, SessionState::Idle | SessionState::Connecting)
                    })
                    .await
                    .map(|state| *state)
                    .ok()
            } => settled,
            joined = &mut worker => {
                let err = start_failure(joined);
                self.discard(&session, &err).await;
                return Err(err);
            }
        };

        if settled == Some(SessionState::Running) {
            let status = self.status_of(Some(&session));
            self.current.store(Some(session.clone()));
            *slot = Some(ActiveSession { session, worker });
            return Ok(status);
        }

        // The worker has already given up; its result carries the reason.
        let err = start_failure(worker.await);
        self.discard(&session, &err).await;
        Err(err)
    }

    /// Release whatever a session that never started still holds.
    async fn discard(&self, session: &Session, reason: &RelayError) {
        warn!(session_id = %session.id(), error = %reason, "Session failed to start");
        if let Err(e) = session.stop().await {
            debug!(session_id = %session.id(), error = %e, "Error stopping failed session");
        }
    }

    /// Stop the active session, leaving subscribers connected.
    ///
    /// Returns false if there was nothing to stop.
    pub async fn stop_session(&self) -> bool {
        let mut slot = self.active.lock().await;
        let Some(active) = slot.take() else {
            return false;
        };
        self.current.store(None);
        self.shutdown_active(active).await;
        true
    }

    /// Stop the active session and disconnect every subscriber.
    pub async fn terminate(&self) {
        let stopped = self.stop_session().await;
        let closed = self.subscribers.close_all().await;
        info!(session_stopped = stopped, subscribers_closed = closed, "Voice relay terminated");
    }

    async fn shutdown_active(&self, active: ActiveSession) {
        let ActiveSession { session, mut worker } = active;
        let session_id = session.id().to_string();

        if let Err(e) = session.stop().await {
            warn!(session_id = %session_id, error = %e, "Error stopping session");
        }

        let join_timeout = session.config().timing.join_timeout;
        match tokio::time::timeout(join_timeout, &mut worker).await {
            Ok(Ok(Ok(()))) => debug!(session_id = %session_id, "Session worker joined"),
            Ok(Ok(Err(e))) => debug!(session_id = %session_id, error = %e, "Session worker joined with error"),
            Ok(Err(e)) => error!(session_id = %session_id, error = %e, "Session worker panicked"),
            Err(_) => {
                warn!(session_id = %session_id, "Session worker did not finish in time, aborting");
                worker.abort();
            }
        }
    }

    // =========================================================================
    // Status and ingest
    // =========================================================================

    pub fn status(&self) -> SessionStatus {
        let current = self.current.load_full();
        self.status_of(current.as_ref())
    }

    fn status_of(&self, session: Option<&Arc<Session>>) -> SessionStatus {
        SessionStatus {
            running: session.is_some_and(|s| s.is_running()),
            state: session.map(|s| s.state()).unwrap_or_default(),
            session_id: session.map(|s| s.id().to_string()),
            subscribers: self.subscribers.len(),
            serverless: session.map_or(self.defaults.serverless, |s| s.config().serverless),
        }
    }

    /// Queue audio for the running session.
    ///
    /// Returns `NotRunning` when there is no running session; the audio is
    /// discarded.
    pub async fn submit_audio(&self, data: Bytes, format: &str) -> RelayResult<()> {
        let Some(session) = self.current.load_full().filter(|s| s.is_running()) else {
            debug!(bytes = data.len(), "No running session, discarding audio");
            return Err(RelayError::NotRunning);
        };
        session.submit(AudioChunk::new(data, format)).await
    }

    pub fn register_subscriber(&self, sink: &Arc<dyn AudioSink>) -> SubscriberId {
        self.subscribers.register(sink)
    }

    pub fn unregister_subscriber(&self, id: &SubscriberId) -> bool {
        self.subscribers.unregister(id)
    }
}

/// Reason a session worker finished before its session was running.
fn start_failure(joined: Result<RelayResult<()>, JoinError>) -> RelayError {
    match joined {
        Ok(Err(e)) => e,
        Ok(Ok(())) => {
            RelayError::InvalidState("session ended before it started running".to_string())
        }
        Err(e) => RelayError::FatalStream(format!("session worker failed: {e}")),
    }
}
