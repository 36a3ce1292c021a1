//! REST route configuration

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, calls};
use crate::state::AppState;
use std::sync::Arc;

/// Create the REST API router
///
/// # Endpoints
///
/// - `GET /` - Health check
/// - `POST /make-call` - Place an outbound call bridged to the realtime endpoint
/// - `POST /call-status` - Provider webhook for call lifecycle updates
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/make-call", post(calls::make_call))
        .route("/call-status", post(calls::call_status))
        .layer(TraceLayer::new_for_http())
}
