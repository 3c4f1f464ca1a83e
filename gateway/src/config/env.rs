//! Environment variable loading.
//!
//! Values from `.env` are already in the process environment by the time
//! these helpers run (`dotenvy` is loaded in `main`).

use std::env;
use std::path::PathBuf;

use zeroize::Zeroizing;

use super::{ServerConfig, TlsConfig};

/// Read a variable, treating empty values as unset.
pub(crate) fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable into `T`, falling back to `default` when unset.
pub(crate) fn parse_var<T>(name: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid value for {name} '{raw}': {e}")),
        None => Ok(default),
    }
}

/// Parse a boolean flag (`1/0`, `true/false`, `yes/no`, `on/off`).
pub(crate) fn parse_bool(name: &str, default: bool) -> Result<bool, String> {
    match var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(format!("Invalid boolean for {name}: '{raw}'")),
        },
        None => Ok(default),
    }
}

/// Build a configuration from environment variables over defaults.
pub(crate) fn load() -> Result<ServerConfig, String> {
    let defaults = ServerConfig::default();

    let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => {
            return Err(
                "Both TLS_CERT_PATH and TLS_KEY_PATH must be set to enable TLS".to_string(),
            );
        }
    };

    // Hosted function platforms set VERCEL=1.
    let serverless_default = var("VERCEL").as_deref() == Some("1");

    Ok(ServerConfig {
        host: var("HOST").unwrap_or(defaults.host),
        port: parse_var("PORT", defaults.port)?,
        tls,
        cors_allowed_origins: var("CORS_ALLOWED_ORIGINS").or(defaults.cors_allowed_origins),
        gemini_api_key: var("GEMINI_API_KEY").map(Zeroizing::new),
        gemini_model: var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
        voice_name: var("VOICE_NAME").unwrap_or(defaults.voice_name),
        system_instruction: var("SYSTEM_INSTRUCTION"),
        send_sample_rate: parse_var("SEND_SAMPLE_RATE", defaults.send_sample_rate)?,
        receive_sample_rate: parse_var("RECEIVE_SAMPLE_RATE", defaults.receive_sample_rate)?,
        max_connect_retries: parse_var("MAX_CONNECT_RETRIES", defaults.max_connect_retries)?,
        retry_delay_ms: parse_var("RETRY_DELAY_MS", defaults.retry_delay_ms)?,
        connect_timeout_secs: parse_var("CONNECTION_TIMEOUT", defaults.connect_timeout_secs)?,
        outbound_queue_capacity: parse_var(
            "OUTBOUND_QUEUE_CAPACITY",
            defaults.outbound_queue_capacity,
        )?,
        serverless: parse_bool("SERVERLESS", serverless_default)?,
        auto_start_session: parse_bool("AUTO_START_SESSION", defaults.auto_start_session)?,
    })
}
