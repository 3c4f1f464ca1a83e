use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::session::SessionManager;
use crate::core::upstream::{SharedLiveClient, create_live_client};
use crate::errors::AppError;

/// Shared state injected into every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Build state backed by the Gemini Live client.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, AppError> {
        let api_key = config.gemini_api_key().map_err(AppError::Configuration)?;
        let client = create_live_client("gemini", api_key)?;
        Ok(Self::with_client(config, client))
    }

    /// Build state around an explicit upstream client.
    pub fn with_client(config: ServerConfig, client: SharedLiveClient) -> Arc<Self> {
        let sessions = Arc::new(SessionManager::new(client, config.session_config()));
        Arc::new(Self { config, sessions })
    }
}
