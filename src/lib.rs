//! Voicebridge connects phone calls to a realtime speech model.
//!
//! One leg is a telephony media stream (Twilio Media Streams over
//! WebSocket), the other is the OpenAI Realtime API. For every call the
//! relay engine negotiates an upstream session, batches caller audio into
//! combined chunks, forwards them upstream, and echoes model audio back
//! onto the call tagged with the call's stream identifier.
//!
//! The HTTP surface is small: a health endpoint, the media-stream
//! WebSocket upgrade, outbound call placement, and the telephony status
//! webhook.

pub mod config;
pub mod core;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod telephony;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use core::relay::{RelayConfig, RelayEngine, RelayError};
pub use state::AppState;
