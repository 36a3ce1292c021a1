//! Server configuration.
//!
//! All configuration comes from environment variables; the binary loads a
//! `.env` file first, so either works. Validation is fail-fast: a missing
//! credential stops startup instead of failing the first call.
//!
//! Required: `OPENAI_API_KEY`, `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`,
//! `PHONE_NUMBER_FROM`, `DOMAIN`. Everything else has a default.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::core::realtime::config::{DEFAULT_REALTIME_URL, RealtimeModel, RealtimeVoice};
use crate::core::relay::buffer::{DEFAULT_FLUSH_MAX_BYTES, DEFAULT_FLUSH_MAX_CHUNKS};
use crate::core::relay::engine::DEFAULT_OUTBOUND_QUEUE_CAPACITY;
use crate::core::relay::session::DEFAULT_INSTRUCTIONS;
use crate::utils::phone::validate_phone_number;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 6060;

/// Default public REST endpoint of the telephony provider.
pub const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com";

// Strips a leading URL scheme and trailing slashes so DOMAIN can be given
// either way ("https://abc.ngrok.io/" or "abc.ngrok.io").
static DOMAIN_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^\w+:|^)//|/+$").expect("domain pattern compiles"));

/// Configuration problems that stop startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Everything the bridge needs to run:
/// - listen address and optional TLS
/// - the public DOMAIN callers and webhooks reach this server at
/// - realtime endpoint credentials and session defaults
/// - telephony REST credentials for outbound call placement
/// - relay tuning (flush thresholds, commit cadence, queue bound)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Public hostname, scheme-free. Embedded into TwiML stream URLs and
    /// status-callback URLs.
    pub domain: String,
    pub cors_allowed_origins: Option<String>,

    // Upstream realtime endpoint
    pub openai_api_key: String,
    pub realtime_url: String,
    pub realtime_model: RealtimeModel,
    pub voice: RealtimeVoice,
    pub system_instructions: String,

    // Telephony REST API
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub phone_number_from: String,
    pub twilio_api_url: String,

    // Relay tuning
    pub flush_max_chunks: usize,
    pub flush_max_bytes: usize,
    pub commit_on_flush: bool,
    pub outbound_queue_capacity: usize,
}

/// Zeroize secrets when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.openai_api_key.zeroize();
        self.twilio_auth_token.zeroize();
    }
}

impl ServerConfig {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", DEFAULT_PORT)?;
        let tls = load_tls()?;

        let domain = normalize_domain(&required("DOMAIN")?);
        if domain.is_empty() {
            return Err(ConfigError::InvalidVar {
                name: "DOMAIN",
                reason: "empty after stripping scheme and slashes".to_string(),
            });
        }

        let openai_api_key = required("OPENAI_API_KEY")?;
        let realtime_url =
            optional("OPENAI_REALTIME_URL").unwrap_or_else(|| DEFAULT_REALTIME_URL.to_string());
        validate_ws_url("OPENAI_REALTIME_URL", &realtime_url)?;
        let realtime_model = match optional("OPENAI_REALTIME_MODEL") {
            Some(raw) => RealtimeModel::parse(&raw).ok_or(ConfigError::InvalidVar {
                name: "OPENAI_REALTIME_MODEL",
                reason: format!("unknown model '{raw}'"),
            })?,
            None => RealtimeModel::default(),
        };
        let voice = match optional("OPENAI_VOICE") {
            Some(raw) => RealtimeVoice::parse(&raw).ok_or(ConfigError::InvalidVar {
                name: "OPENAI_VOICE",
                reason: format!("unknown voice '{raw}'"),
            })?,
            None => RealtimeVoice::default(),
        };
        let system_instructions =
            optional("SYSTEM_INSTRUCTIONS").unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());

        let twilio_account_sid = required("TWILIO_ACCOUNT_SID")?;
        let twilio_auth_token = required("TWILIO_AUTH_TOKEN")?;
        let phone_number_from = required("PHONE_NUMBER_FROM")?;
        validate_phone_number(&phone_number_from).map_err(|e| ConfigError::InvalidVar {
            name: "PHONE_NUMBER_FROM",
            reason: e.to_string(),
        })?;
        let twilio_api_url =
            optional("TWILIO_API_URL").unwrap_or_else(|| DEFAULT_TWILIO_API_URL.to_string());
        validate_http_url("TWILIO_API_URL", &twilio_api_url)?;

        let flush_max_chunks = parse_or("FLUSH_MAX_CHUNKS", DEFAULT_FLUSH_MAX_CHUNKS)?;
        if flush_max_chunks == 0 {
            return Err(ConfigError::InvalidVar {
                name: "FLUSH_MAX_CHUNKS",
                reason: "must be at least 1".to_string(),
            });
        }
        let flush_max_bytes = parse_or("FLUSH_MAX_BYTES", DEFAULT_FLUSH_MAX_BYTES)?;
        let commit_on_flush = parse_bool_or("COMMIT_ON_FLUSH", true)?;
        let outbound_queue_capacity =
            parse_or("OUTBOUND_QUEUE_CAPACITY", DEFAULT_OUTBOUND_QUEUE_CAPACITY)?;
        if outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidVar {
                name: "OUTBOUND_QUEUE_CAPACITY",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            tls,
            domain,
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS"),
            openai_api_key,
            realtime_url,
            realtime_model,
            voice,
            system_instructions,
            twilio_account_sid,
            twilio_auth_token,
            phone_number_from,
            twilio_api_url,
            flush_max_chunks,
            flush_max_bytes,
            commit_on_flush,
            outbound_queue_capacity,
        })
    }

    /// Listen address for the HTTP server.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Wire URL the telephony edge connects its media stream to.
    pub fn media_stream_url(&self) -> String {
        format!("wss://{}/media-stream", self.domain)
    }

    /// Where the telephony provider posts call-lifecycle updates.
    pub fn status_callback_url(&self) -> String {
        format!("https://{}/call-status", self.domain)
    }
}

/// Strip URL scheme and trailing slashes from a configured domain.
pub fn normalize_domain(raw: &str) -> String {
    DOMAIN_STRIP.replace_all(raw.trim(), "").to_string()
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional(name) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidVar {
                name,
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
        None => Ok(default),
    }
}

fn validate_ws_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidVar {
            name,
            reason: format!("expected ws:// or wss://, got {other}://"),
        }),
    }
}

fn validate_http_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidVar {
            name,
            reason: format!("expected http:// or https://, got {other}://"),
        }),
    }
}

fn load_tls() -> Result<Option<TlsConfig>, ConfigError> {
    match (optional("TLS_CERT_PATH"), optional("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::InvalidVar {
            name: "TLS_KEY_PATH",
            reason: "TLS_CERT_PATH is set without TLS_KEY_PATH".to_string(),
        }),
        (None, Some(_)) => Err(ConfigError::InvalidVar {
            name: "TLS_CERT_PATH",
            reason: "TLS_KEY_PATH is set without TLS_CERT_PATH".to_string(),
        }),
    }
}
