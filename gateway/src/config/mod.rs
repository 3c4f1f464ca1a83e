//! Configuration module for the voice relay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

mod env;
mod yaml;

use crate::core::audio::{RECEIVE_SAMPLE_RATE, SEND_SAMPLE_RATE};
use crate::core::session::{SessionConfig, SessionTiming};
use crate::core::upstream::{DEFAULT_GEMINI_MODEL, LiveConnectConfig};

/// Browser clients are usually served from another origin, so every origin
/// is allowed unless configured otherwise.
pub const DEFAULT_CORS_ORIGINS: &str = "*";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the relay:
/// - Server settings (host, port, TLS, CORS)
/// - Upstream provider settings (API key, model, voice, system instruction)
/// - Audio rates and session engine tuning
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Comma-separated origins, or "*"
    pub cors_allowed_origins: Option<String>,

    // Upstream provider
    /// Gemini API key, wiped from memory on drop
    pub gemini_api_key: Option<Zeroizing<String>>,
    pub gemini_model: String,
    pub voice_name: String,
    pub system_instruction: Option<String>,

    // Audio
    pub send_sample_rate: u32,
    pub receive_sample_rate: u32,

    // Session engine
    pub max_connect_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub outbound_queue_capacity: usize,
    /// Disables the ingest keepalive stage
    pub serverless: bool,
    /// Start a session when a WebSocket client connects and none is running
    pub auto_start_session: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            tls: None,
            cors_allowed_origins: Some(DEFAULT_CORS_ORIGINS.to_string()),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            voice_name: "Puck".to_string(),
            system_instruction: None,
            send_sample_rate: SEND_SAMPLE_RATE,
            receive_sample_rate: RECEIVE_SAMPLE_RATE,
            max_connect_retries: 3,
            retry_delay_ms: 1000,
            connect_timeout_secs: 30,
            outbound_queue_capacity: 64,
            serverless: false,
            auto_start_session: true,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("gemini_model", &self.gemini_model)
            .field("voice_name", &self.voice_name)
            .field("system_instruction", &self.system_instruction)
            .field("send_sample_rate", &self.send_sample_rate)
            .field("receive_sample_rate", &self.receive_sample_rate)
            .field("max_connect_retries", &self.max_connect_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("outbound_queue_capacity", &self.outbound_queue_capacity)
            .field("serverless", &self.serverless)
            .field("auto_start_session", &self.auto_start_session)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` values are expected to be loaded into the environment already.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let mut config = env::load()?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: yaml::YamlConfig) -> Result<(), String> {
        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(tls) = server.tls {
                if tls.enabled == Some(false) {
                    self.tls = None;
                } else {
                    match (tls.cert_path, tls.key_path) {
                        (Some(cert), Some(key)) => {
                            self.tls = Some(TlsConfig {
                                cert_path: PathBuf::from(cert),
                                key_path: PathBuf::from(key),
                            });
                        }
                        (None, None) => {}
                        _ => {
                            return Err(
                                "Both server.tls.cert_path and server.tls.key_path must be set"
                                    .to_string(),
                            );
                        }
                    }
                }
            }
        }

        if let Some(gemini) = yaml.gemini {
            if let Some(key) = gemini.api_key.filter(|k| !k.trim().is_empty()) {
                self.gemini_api_key = Some(Zeroizing::new(key));
            }
            if let Some(model) = gemini.model {
                self.gemini_model = model;
            }
            if let Some(voice) = gemini.voice {
                self.voice_name = voice;
            }
            if let Some(instruction) = gemini.system_instruction {
                self.system_instruction = Some(instruction);
            }
        }

        if let Some(audio) = yaml.audio {
            if let Some(rate) = audio.send_sample_rate {
                self.send_sample_rate = rate;
            }
            if let Some(rate) = audio.receive_sample_rate {
                self.receive_sample_rate = rate;
            }
        }

        if let Some(session) = yaml.session {
            if let Some(retries) = session.max_connect_retries {
                self.max_connect_retries = retries;
            }
            if let Some(delay) = session.retry_delay_ms {
                self.retry_delay_ms = delay;
            }
            if let Some(timeout) = session.connect_timeout_secs {
                self.connect_timeout_secs = timeout;
            }
            if let Some(capacity) = session.outbound_queue_capacity {
                self.outbound_queue_capacity = capacity;
            }
            if let Some(serverless) = session.serverless {
                self.serverless = serverless;
            }
            if let Some(auto_start) = session.auto_start {
                self.auto_start_session = auto_start;
            }
        }

        if let Some(security) = yaml.security
            && let Some(origins) = security.cors_allowed_origins
        {
            self.cors_allowed_origins = Some(origins);
        }

        Ok(())
    }

    /// Reject values the session engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connect_retries == 0 {
            return Err("max_connect_retries must be at least 1".to_string());
        }
        if self.outbound_queue_capacity == 0 {
            return Err("outbound_queue_capacity must be at least 1".to_string());
        }
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be at least 1".to_string());
        }
        if self.send_sample_rate == 0 || self.receive_sample_rate == 0 {
            return Err("sample rates must be non-zero".to_string());
        }
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Gemini API key, or an error naming the missing setting.
    pub fn gemini_api_key(&self) -> Result<&str, String> {
        self.gemini_api_key
            .as_ref()
            .map(|key| key.as_str())
            .ok_or_else(|| "GEMINI_API_KEY is not configured".to_string())
    }

    /// Parameters for opening an upstream stream.
    pub fn live_connect_config(&self) -> LiveConnectConfig {
        LiveConnectConfig {
            voice_name: self.voice_name.clone(),
            system_instruction: self.system_instruction.clone(),
            input_sample_rate: self.send_sample_rate,
            output_sample_rate: self.receive_sample_rate,
            ..Default::default()
        }
    }

    /// Default configuration for new sessions.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.gemini_model.clone(),
            connect: self.live_connect_config(),
            max_retries: self.max_connect_retries,
            outbound_queue_capacity: self.outbound_queue_capacity,
            serverless: self.serverless,
            timing: SessionTiming {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for name in [
                "HOST",
                "PORT",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
                "CORS_ALLOWED_ORIGINS",
                "GEMINI_API_KEY",
                "GEMINI_MODEL",
                "VOICE_NAME",
                "SYSTEM_INSTRUCTION",
                "SEND_SAMPLE_RATE",
                "RECEIVE_SAMPLE_RATE",
                "MAX_CONNECT_RETRIES",
                "RETRY_DELAY_MS",
                "CONNECTION_TIMEOUT",
                "OUTBOUND_QUEUE_CAPACITY",
                "SERVERLESS",
                "VERCEL",
                "AUTO_START_SESSION",
            ] {
                env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.gemini_model, "models/gemini-2.0-flash-live-001");
        assert_eq!(config.voice_name, "Puck");
        assert_eq!(config.send_sample_rate, 16000);
        assert_eq!(config.receive_sample_rate, 24000);
        assert_eq!(config.max_connect_retries, 3);
        assert!(!config.serverless);
        assert!(config.auto_start_session);
        assert!(!config.is_tls_enabled());
        assert_eq!(config.cors_allowed_origins.as_deref(), Some("*"));
    }

    #[test]
    #[serial]
    fn test_cors_origins_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("CORS_ALLOWED_ORIGINS", "https://app.example.com");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(
            config.cors_allowed_origins.as_deref(),
            Some("https://app.example.com")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("HOST", "127.0.0.1");
            env::set_var("PORT", "8080");
            env::set_var("GEMINI_API_KEY", "env-key");
            env::set_var("VOICE_NAME", "Kore");
            env::set_var("OUTBOUND_QUEUE_CAPACITY", "16");
            env::set_var("VERCEL", "1");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.gemini_api_key().unwrap(), "env-key");
        assert_eq!(config.voice_name, "Kore");
        assert_eq!(config.outbound_queue_capacity, 16);
        assert!(config.serverless);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "seventy");
        }

        let result = ServerConfig::from_env();
        assert!(result.unwrap_err().to_string().contains("PORT"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_partial_tls_rejected() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
        }

        assert!(ServerConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
gemini:
  api_key: "yaml-key"
session:
  max_connect_retries: 5
  auto_start: false
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "10.0.0.1");
            env::set_var("GEMINI_API_KEY", "env-key");
            env::set_var("VOICE_NAME", "Charon");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.gemini_api_key().unwrap(), "yaml-key");
        assert_eq!(config.max_connect_retries, 5);
        assert!(!config.auto_start_session);
        // ENV value survives where YAML is silent
        assert_eq!(config.voice_name, "Charon");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_zero_capacity() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "session:\n  outbound_queue_capacity: 0\n").unwrap();

        assert!(ServerConfig::from_file(&config_path).is_err());
    }

    #[test]
    fn test_tls_from_yaml() {
        let mut config = ServerConfig::default();
        let yaml: yaml::YamlConfig = serde_yaml::from_str(
            "server:\n  tls:\n    cert_path: \"/c.pem\"\n    key_path: \"/k.pem\"\n",
        )
        .unwrap();
        config.apply_yaml(yaml).unwrap();

        assert!(config.is_tls_enabled());
        assert_eq!(
            config.tls.unwrap().cert_path,
            PathBuf::from("/c.pem")
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ServerConfig {
            gemini_api_key: Some(Zeroizing::new("super-secret".to_string())),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_session_config_mapping() {
        let config = ServerConfig {
            gemini_model: "gemini-live".to_string(),
            voice_name: "Aoede".to_string(),
            retry_delay_ms: 250,
            connect_timeout_secs: 5,
            outbound_queue_capacity: 8,
            serverless: true,
            ..Default::default()
        };

        let session = config.session_config();
        assert_eq!(session.model, "gemini-live");
        assert_eq!(session.connect.voice_name, "Aoede");
        assert_eq!(session.connect.output_sample_rate, 24000);
        assert_eq!(session.timing.retry_delay, Duration::from_millis(250));
        assert_eq!(session.timing.connect_timeout, Duration::from_secs(5));
        assert_eq!(session.outbound_queue_capacity, 8);
        assert!(session.serverless);
    }

    #[test]
    fn test_missing_api_key_error() {
        let config = ServerConfig::default();
        assert!(config.gemini_api_key().unwrap_err().contains("GEMINI_API_KEY"));
    }
}
