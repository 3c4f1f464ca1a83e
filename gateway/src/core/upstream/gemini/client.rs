//! Gemini Live WebSocket client.
//!
//! One WebSocket connection per stream. The connection is split so the
//! sender and receiver stages can use it concurrently: the write half and the
//! read half each sit behind their own async mutex.
//!
//! Handshake: `setup` is sent first and the stream is handed out only after
//! the server answers with `setupComplete`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;
use zeroize::Zeroizing;

use super::config::GEMINI_LIVE_URL;
use super::messages::{ClientMessage, ServerMessage};
use crate::core::audio::AudioChunk;
use crate::core::upstream::base::{
    LiveClient, LiveConnectConfig, LiveStream, TurnStream, UpstreamError, UpstreamResult,
};

/// Time allowed for the server to acknowledge `setup`.
const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// Client
// =============================================================================

/// Opens Gemini Live streams authenticated with an API key.
pub struct GeminiLiveClient {
    api_key: Zeroizing<String>,
    endpoint: String,
    setup_timeout: Duration,
}

impl GeminiLiveClient {
    pub fn new(api_key: impl Into<String>) -> UpstreamResult<Self> {
        let api_key = Zeroizing::new(api_key.into());
        if api_key.trim().is_empty() {
            return Err(UpstreamError::InvalidConfiguration(
                "Gemini API key is required".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            endpoint: GEMINI_LIVE_URL.to_string(),
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
        })
    }

    /// Override the endpoint (used against local servers in tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_url(&self) -> UpstreamResult<Url> {
        Url::parse_with_params(&self.endpoint, &[("key", self.api_key.as_str())])
            .map_err(|e| UpstreamError::InvalidConfiguration(format!("invalid endpoint: {e}")))
    }
}

impl std::fmt::Debug for GeminiLiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveClient")
            .field("endpoint", &self.endpoint)
            .field("setup_timeout", &self.setup_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LiveClient for GeminiLiveClient {
    async fn connect_stream(
        &self,
        model: &str,
        config: &LiveConnectConfig,
    ) -> UpstreamResult<Arc<dyn LiveStream>> {
        let url = self.request_url()?;

        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| UpstreamError::ConnectionFailed(e.to_string()))?;

        let (mut sink, mut source) = ws_stream.split();

        let setup = serde_json::to_string(&ClientMessage::setup(model, config))
            .map_err(|e| UpstreamError::Serialization(e.to_string()))?;
        sink.send(Message::Text(setup.into()))
            .await
            .map_err(map_ws_error)?;

        tokio::time::timeout(self.setup_timeout, await_setup_complete(&mut source))
            .await
            .map_err(|_| UpstreamError::Timeout("waiting for setupComplete".to_string()))??;

        info!(model = %model, voice = %config.voice_name, "Connected to Gemini Live");

        Ok(Arc::new(GeminiLiveStream {
            sink: Mutex::new(sink),
            source: Mutex::new(source),
            closed: AtomicBool::new(false),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

async fn await_setup_complete(source: &mut WsSource) -> UpstreamResult<()> {
    while let Some(frame) = source.next().await {
        let frame = frame.map_err(map_ws_error)?;
        if let Some(message) = decode_frame(frame)?
            && message.is_setup_complete()
        {
            return Ok(());
        }
    }
    Err(UpstreamError::Closed(
        "connection closed before setup completed".to_string(),
    ))
}

// =============================================================================
// Stream
// =============================================================================

/// An established Gemini Live session.
pub struct GeminiLiveStream {
    sink: Mutex<WsSink>,
    source: Mutex<WsSource>,
    closed: AtomicBool,
}

#[async_trait]
impl LiveStream for GeminiLiveStream {
    async fn send(&self, chunk: AudioChunk) -> UpstreamResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(UpstreamError::Closed("stream already closed".to_string()));
        }

        let json = serde_json::to_string(&ClientMessage::realtime_audio(&chunk))
            .map_err(|e| UpstreamError::Serialization(e.to_string()))?;

        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(map_ws_error)
    }

    fn receive(&self) -> TurnStream<'_> {
        Box::pin(async_stream::try_stream! {
            let mut source = self.source.lock().await;
            loop {
                let frame = source
                    .next()
                    .await
                    .ok_or_else(|| UpstreamError::Closed("stream ended".to_string()))?
                    .map_err(map_ws_error)?;

                let Some(message) = decode_frame(frame)? else {
                    continue;
                };

                if let Some(go_away) = &message.go_away {
                    warn!(time_left = ?go_away.time_left, "Gemini requested disconnect");
                }

                let Some(content) = message.server_content else {
                    continue;
                };

                if content.interrupted {
                    debug!("Gemini turn interrupted");
                }

                let turn_complete = content.turn_complete;
                for response in content.into_responses()? {
                    yield response;
                }

                if turn_complete {
                    break;
                }
            }
        })
    }

    async fn close(&self) -> UpstreamResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!("Closing Gemini Live stream");
        match self.sink.lock().await.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

/// Decode one frame. Control frames yield `None`.
fn decode_frame(frame: Message) -> UpstreamResult<Option<ServerMessage>> {
    let parsed = match frame {
        Message::Text(text) => serde_json::from_str::<ServerMessage>(text.as_str()),
        Message::Binary(data) => serde_json::from_slice::<ServerMessage>(&data),
        Message::Close(close) => {
            let reason = close
                .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                .unwrap_or_else(|| "no close frame".to_string());
            return Err(UpstreamError::Closed(reason));
        }
        _ => return Ok(None),
    };

    parsed
        .map(Some)
        .map_err(|e| UpstreamError::Protocol(format!("invalid server message: {e}")))
}

fn map_ws_error(error: tungstenite::Error) -> UpstreamError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            UpstreamError::Closed("connection closed".to_string())
        }
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            UpstreamError::Timeout(io.to_string())
        }
        other => UpstreamError::WebSocket(other.to_string()),
    }
}
