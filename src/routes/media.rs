//! Media-stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream WebSocket router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade for telephony media streams
///
/// # Protocol
///
/// After upgrade the telephony provider sends JSON frames tagged by
/// `event`: a `start` frame carrying the stream SID, then `media` frames
/// with base64 G.711 payloads, then `stop` when the call ends. The bridge
/// answers with `media` frames carrying the assistant's audio for the
/// same stream SID.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
