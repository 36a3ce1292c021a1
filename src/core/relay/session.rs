//! Per-call session state and configuration.
//!
//! Each accepted media stream gets its own `RelayConfig` value and its
//! own `CallSession`. Nothing here is shared across calls, so concurrent
//! sessions can carry different voices or prompts without interfering.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::core::realtime::config::{AudioFormat, Modality, RealtimeModel, RealtimeVoice};
use crate::core::realtime::messages::TurnDetection;
use crate::core::relay::buffer::{DEFAULT_FLUSH_MAX_BYTES, DEFAULT_FLUSH_MAX_CHUNKS};
use crate::core::relay::engine::DEFAULT_OUTBOUND_QUEUE_CAPACITY;

/// Instructions used when the operator configures none.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful, upbeat voice assistant. \
    Keep replies short, natural and conversational, and stay polite.";

/// Priming item sent before the first response so the agent opens the
/// conversation on an outbound call.
pub const DEFAULT_PRIMING: &str =
    "Greet the caller warmly, then keep the conversation natural and concise.";

/// Everything one relay session needs, fixed at session start.
#[derive(Clone)]
pub struct RelayConfig {
    pub realtime_url: String,
    pub api_key: String,
    pub model: RealtimeModel,
    pub voice: RealtimeVoice,
    pub instructions: String,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub modalities: Vec<Modality>,
    pub temperature: Option<f32>,
    pub turn_detection: Option<TurnDetection>,
    /// Opaque JSON for the optional context-setting step. Omitted when
    /// `None`.
    pub context: Option<serde_json::Value>,
    /// System text primed into the conversation before the first
    /// response. Omitted when `None`.
    pub priming: Option<String>,
    /// Send `response.create` after negotiation so the agent speaks
    /// first.
    pub kickoff_response: bool,
    pub flush_max_chunks: usize,
    pub flush_max_bytes: usize,
    /// Commit the upstream input buffer after every flushed chunk.
    pub commit_on_flush: bool,
    pub outbound_queue_capacity: usize,
}

impl RelayConfig {
    /// Per-call snapshot of the server configuration.
    pub fn from_server(config: &ServerConfig) -> Self {
        Self {
            realtime_url: config.realtime_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.realtime_model,
            voice: config.voice,
            instructions: config.system_instructions.clone(),
            flush_max_chunks: config.flush_max_chunks,
            flush_max_bytes: config.flush_max_bytes,
            commit_on_flush: config.commit_on_flush,
            outbound_queue_capacity: config.outbound_queue_capacity,
            ..Self::default()
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            realtime_url: crate::core::realtime::config::DEFAULT_REALTIME_URL.to_string(),
            api_key: String::new(),
            model: RealtimeModel::default(),
            voice: RealtimeVoice::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            input_audio_format: AudioFormat::G711Ulaw,
            output_audio_format: AudioFormat::G711Ulaw,
            modalities: vec![Modality::Text, Modality::Audio],
            temperature: Some(0.7),
            turn_detection: Some(TurnDetection::server_vad()),
            context: None,
            priming: Some(DEFAULT_PRIMING.to_string()),
            kickoff_response: true,
            flush_max_chunks: DEFAULT_FLUSH_MAX_CHUNKS,
            flush_max_bytes: DEFAULT_FLUSH_MAX_BYTES,
            commit_on_flush: true,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

/// State shared by the two pumps of one call.
///
/// The stream identifier is written once by the inbound pump when the
/// start frame arrives and read by the outbound pump on every audio
/// delta, so it lives behind a guarded cell.
#[derive(Debug)]
pub struct CallSession {
    stream_sid: RwLock<Option<String>>,
    started_at: Instant,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            stream_sid: RwLock::new(None),
            started_at: Instant::now(),
        }
    }

    pub async fn set_stream_sid(&self, sid: String) {
        *self.stream_sid.write().await = Some(sid);
    }

    pub async fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().await.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}
