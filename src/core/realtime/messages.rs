//! Realtime API wire messages.
//!
//! Client events (sent upstream):
//! - `session.update`
//! - `input_audio_buffer.append` / `input_audio_buffer.commit`
//! - `conversation.context.set` (optional, opaque JSON)
//! - `conversation.item.create`
//! - `response.create`
//!
//! Server events (received): audio deltas plus the session, VAD and
//! rate-limit notifications the relay logs. Everything else lands in the
//! `Unrecognized` catch-all instead of failing the decode.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use super::config::{AudioFormat, RealtimeVoice};

// ===== Session configuration =====

/// Session body carried by `session.update`. Fields left `None` are
/// omitted from the wire so the provider keeps its own defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<RealtimeVoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Turn detection modes. `None {}` serializes as `{"type":"none"}` and
/// disables server-side end-of-speech detection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interrupt_response: Option<bool>,
    },
    #[serde(rename = "none")]
    None {},
}

impl TurnDetection {
    /// Server VAD with every parameter left to the provider.
    pub fn server_vad() -> Self {
        Self::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
            create_response: None,
            interrupt_response: None,
        }
    }
}

// ===== Conversation items =====

#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A system-role text item, used to prime the conversation before the
    /// first response.
    pub fn system_text(text: impl Into<String>) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "system".to_string(),
            content: vec![ContentPart {
                content_type: "input_text".to_string(),
                text: text.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

// ===== Client events =====

/// Events sent to the realtime endpoint, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
    #[serde(rename = "conversation.context.set")]
    ConversationContextSet { context: serde_json::Value },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Append already-encoded audio to the upstream input buffer. The
    /// payload is relayed as received from the telephony edge, never
    /// re-encoded.
    pub fn append(audio: impl Into<String>) -> Self {
        Self::InputAudioBufferAppend { audio: audio.into() }
    }
}

// ===== Server events =====

/// Events received from the realtime endpoint, tagged by `type`. Only
/// `response.audio.delta` drives the relay; the rest inform logging.
/// Unknown tags fold into `Unrecognized`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(rename = "session.created")]
    SessionCreated { session: Session },
    #[serde(rename = "session.updated")]
    SessionUpdated { session: Session },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: Option<u64>,
    },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: String },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone,
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseSummary,
    },
    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated { rate_limits: Vec<RateLimit> },
    #[serde(other)]
    Unrecognized,
}

impl ServerEvent {
    /// Wire tag of the event, for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::SpeechStarted { .. } => "input_audio_buffer.speech_started",
            Self::SpeechStopped { .. } => "input_audio_buffer.speech_stopped",
            Self::InputAudioBufferCommitted { .. } => "input_audio_buffer.committed",
            Self::AudioDelta { .. } => "response.audio.delta",
            Self::AudioTranscriptDone { .. } => "response.audio_transcript.done",
            Self::ContentPartDone => "response.content_part.done",
            Self::ResponseDone { .. } => "response.done",
            Self::RateLimitsUpdated { .. } => "rate_limits.updated",
            Self::Unrecognized => "unknown",
        }
    }
}

/// Error payload on an `error` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Subset of the session resource the relay logs.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimit {
    pub name: String,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub remaining: Option<u64>,
    #[serde(default)]
    pub reset_seconds: Option<f64>,
}

/// Decode a base64 audio delta into raw bytes. The relay forwards deltas
/// verbatim; this exists for consumers that need the samples.
pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_STANDARD.decode(delta)
}
