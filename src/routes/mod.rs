//! Route configuration.

pub mod api;
pub mod media;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble every route group into one router.
///
/// CORS and TLS are layered on in `main`; tests serve this router as-is.
pub fn create_router() -> Router<Arc<AppState>> {
    api::create_api_router().merge(media::create_media_router())
}
