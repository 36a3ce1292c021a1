//! Media-stream WebSocket endpoint
//!
//! The telephony provider connects here, as instructed by the TwiML handed
//! to it at call creation, and streams the call's audio. A relay engine
//! bridges that socket to the upstream realtime endpoint for the lifetime
//! of the call.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::core::relay::{RelayConfig, RelayEngine};
use crate::state::AppState;

/// Upgrade the provider's connection and run a relay session on it.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("media stream upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    let active = state.session_started();
    info!(%session_id, active_sessions = active, "media stream connected");

    let config = RelayConfig::from_server(&state.config);
    let result = RelayEngine::new(config)
        .run(socket)
        .instrument(info_span!("relay", %session_id))
        .await;

    if let Err(e) = result {
        error!(%session_id, error = %e, "relay session failed");
    }

    let active = state.session_ended();
    info!(%session_id, active_sessions = active, "media stream closed");
}
