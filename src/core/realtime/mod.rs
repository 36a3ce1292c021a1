//! Upstream leg: the realtime speech endpoint.
//!
//! - `config`: models, voices and audio formats with their wire names
//! - `messages`: client/server event types
//! - `client`: authenticated WebSocket connection and its split halves

pub mod client;
pub mod config;
pub mod messages;

pub use client::{
    ConnectionError, RealtimeConnection, RealtimeReader, RealtimeWriter, TransportError,
};
pub use config::{AudioFormat, DEFAULT_REALTIME_URL, Modality, RealtimeModel, RealtimeVoice};
pub use messages::{ClientEvent, ServerEvent, SessionConfig, TurnDetection};
