//! Audio stream WebSocket handler
//!
//! Every connection is both an audio source and a broadcast subscriber. The
//! socket is split: a sender task drains a [`MessageRoute`] channel into the
//! socket while the handler loop reads client frames.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use base64::prelude::*;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::core::audio::DEFAULT_AUDIO_FORMAT;
use crate::core::session::{AudioSink, RelayEnvelope, RelayError, RelayResult, SessionManager};
use crate::state::AppState;

use super::messages::{ControlCommand, IncomingMessage, MessageRoute};

/// Per-connection outgoing buffer
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

// =============================================================================
// Subscriber
// =============================================================================

/// Broadcast sink backed by a WebSocket connection's sender task.
pub struct WsSubscriber {
    routes: mpsc::Sender<MessageRoute>,
}

impl WsSubscriber {
    pub fn new(routes: mpsc::Sender<MessageRoute>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl AudioSink for WsSubscriber {
    async fn send(&self, message: &str) -> RelayResult<()> {
        // A lagging client drops messages instead of stalling the broadcast.
        self.routes
            .try_send(MessageRoute::Outgoing(message.to_string()))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    RelayError::SubscriberDelivery("subscriber buffer full".to_string())
                }
                TrySendError::Closed(_) => {
                    RelayError::SubscriberDelivery("connection closed".to_string())
                }
            })
    }

    async fn close(&self) {
        let _ = self.routes.send(MessageRoute::Close).await;
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Audio stream WebSocket handler
///
/// Upgrades the connection, registers the peer as a broadcast subscriber and
/// relays its audio to the active session.
pub async fn audio_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Audio stream WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_audio_socket(socket, state))
}

async fn handle_audio_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(text) => sender.send(Message::Text(text.into())).await,
                MessageRoute::Close => {
                    debug!("Closing audio stream WebSocket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let sessions = app_state.sessions.clone();
    let sink: Arc<dyn AudioSink> = Arc::new(WsSubscriber::new(route_tx.clone()));
    let subscriber_id = sessions.register_subscriber(&sink);
    info!(subscriber_id = %subscriber_id, "Audio stream client connected");

    if app_state.config.auto_start_session && !sessions.status().running {
        info!(subscriber_id = %subscriber_id, "No running session, starting one");
        spawn_ensure_started(sessions.clone(), route_tx.clone());
    }

    let mut sender_task = sender_task;
    loop {
        select! {
            msg = receiver.next() => match msg {
                Some(Ok(msg)) => {
                    if !process_message(msg, &sessions, &route_tx).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(subscriber_id = %subscriber_id, "Audio stream WebSocket error: {}", e);
                    break;
                }
                None => {
                    debug!(subscriber_id = %subscriber_id, "Audio stream closed by client");
                    break;
                }
            },
            // The sender task ends on Close (e.g. terminate) or a write failure.
            _ = &mut sender_task => {
                debug!(subscriber_id = %subscriber_id, "Audio stream sender finished");
                break;
            }
        }
    }

    // Cleanup
    sessions.unregister_subscriber(&subscriber_id);
    drop(sink);
    sender_task.abort();

    info!(subscriber_id = %subscriber_id, "Audio stream client disconnected");
}

/// Process one client frame. Returns false when the connection should end.
async fn process_message(
    msg: Message,
    sessions: &Arc<SessionManager>,
    route_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            handle_text(text.as_str(), sessions, route_tx).await;
            true
        }
        Message::Binary(data) => {
            submit(sessions, data, DEFAULT_AUDIO_FORMAT).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!("Audio stream close received");
            false
        }
    }
}

async fn handle_text(
    text: &str,
    sessions: &Arc<SessionManager>,
    route_tx: &mpsc::Sender<MessageRoute>,
) {
    // Text that is not JSON at all is raw audio.
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            submit(
                sessions,
                Bytes::copy_from_slice(text.as_bytes()),
                DEFAULT_AUDIO_FORMAT,
            )
            .await;
            return;
        }
    };

    let message: IncomingMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring unsupported audio stream message: {}", e);
            return;
        }
    };

    match message {
        IncomingMessage::Audio { format, data } => match BASE64_STANDARD.decode(data.as_bytes()) {
            Ok(audio) => {
                let format = format.as_deref().unwrap_or(DEFAULT_AUDIO_FORMAT);
                submit(sessions, Bytes::from(audio), format).await;
            }
            Err(e) => {
                warn!("Invalid base64 audio payload: {}", e);
                send_error(route_tx, format!("Invalid audio data: {e}")).await;
            }
        },
        IncomingMessage::Control {
            command: ControlCommand::Start,
        } => {
            info!("Client requested session start");
            spawn_ensure_started(sessions.clone(), route_tx.clone());
        }
        IncomingMessage::Control {
            command: ControlCommand::Stop,
        } => {
            info!("Client requested session stop");
            sessions.stop_session().await;
        }
    }
}

async fn submit(sessions: &SessionManager, data: Bytes, format: &str) {
    match sessions.submit_audio(data, format).await {
        Ok(()) => {}
        Err(RelayError::NotRunning) => {}
        Err(e) => debug!("Audio not submitted: {}", e),
    }
}

fn spawn_ensure_started(sessions: Arc<SessionManager>, route_tx: mpsc::Sender<MessageRoute>) {
    tokio::spawn(async move {
        if let Err(e) = sessions.ensure_started().await {
            error!("Failed to start session: {}", e);
            send_error(&route_tx, e.to_string()).await;
        }
    });
}

async fn send_error(route_tx: &mpsc::Sender<MessageRoute>, message: String) {
    match RelayEnvelope::error(message).to_json() {
        Ok(json) => {
            let _ = route_tx.send(MessageRoute::Outgoing(json)).await;
        }
        Err(e) => error!("Failed to serialize error message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ws_subscriber_forwards_text() {
        let (tx, mut rx) = mpsc::channel(4);
        let subscriber = WsSubscriber::new(tx);

        subscriber.send("payload").await.unwrap();
        match rx.recv().await {
            Some(MessageRoute::Outgoing(text)) => assert_eq!(text, "payload"),
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ws_subscriber_full_buffer_fails_fast() {
        let (tx, _rx) = mpsc::channel(1);
        let subscriber = WsSubscriber::new(tx);

        subscriber.send("first").await.unwrap();
        assert!(matches!(
            subscriber.send("second").await,
            Err(RelayError::SubscriberDelivery(_))
        ));
    }

    #[tokio::test]
    async fn test_ws_subscriber_closed_connection() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let subscriber = WsSubscriber::new(tx);
        assert!(subscriber.send("x").await.is_err());
    }

    #[tokio::test]
    async fn test_ws_subscriber_close_sends_route() {
        let (tx, mut rx) = mpsc::channel(1);
        WsSubscriber::new(tx).close().await;
        assert!(matches!(rx.recv().await, Some(MessageRoute::Close)));
    }
}
