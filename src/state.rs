//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ServerConfig;
use crate::telephony::TwilioClient;

/// State shared across all handlers.
///
/// Holds the validated configuration, the telephony REST client, and a
/// counter of media-stream sessions currently relaying audio.
pub struct AppState {
    pub config: ServerConfig,
    pub telephony: TwilioClient,
    active_sessions: AtomicUsize,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let telephony = TwilioClient::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.phone_number_from.clone(),
            config.twilio_api_url.clone(),
        );
        Arc::new(Self {
            config,
            telephony,
            active_sessions: AtomicUsize::new(0),
        })
    }

    /// Record a relay session starting. Returns the new active count.
    pub fn session_started(&self) -> usize {
        self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a relay session ending. Returns the new active count. The
    /// stored count saturates at zero, so an unpaired call can never wrap
    /// it around.
    pub fn session_ended(&self) -> usize {
        self.active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                Some(count.saturating_sub(1))
            })
            .map_or(0, |prev| prev.saturating_sub(1))
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }
}
