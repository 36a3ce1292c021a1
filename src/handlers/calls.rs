//! Outbound call endpoints
//!
//! `POST /make-call` places a call whose audio is bridged to the realtime
//! endpoint. `POST /call-status` receives the provider's lifecycle webhooks
//! for calls placed here.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::state::AppState;
use crate::telephony::TelephonyError;
use crate::utils::phone::validate_phone_number;

#[derive(Debug, Deserialize)]
pub struct MakeCallRequest {
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct MakeCallResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MakeCallResponse {
    fn success(call_sid: String) -> Self {
        Self {
            status: "success",
            call_sid: Some(call_sid),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            call_sid: None,
            error: Some(message.into()),
        }
    }
}

/// Place an outbound call to the requested number.
///
/// The call's TwiML points its media stream at this server, so the relay
/// session starts as soon as the callee answers.
pub async fn make_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MakeCallRequest>,
) -> Result<Json<MakeCallResponse>, (StatusCode, Json<MakeCallResponse>)> {
    if let Err(e) = validate_phone_number(&request.phone_number) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(MakeCallResponse::error(e.to_string())),
        ));
    }

    let stream_url = state.config.media_stream_url();
    let status_callback = state.config.status_callback_url();

    match state
        .telephony
        .place_call(&request.phone_number, &stream_url, &status_callback)
        .await
    {
        Ok(call) => Ok(Json(MakeCallResponse::success(call.sid))),
        Err(e @ TelephonyError::InvalidNumber(_)) => Err((
            StatusCode::BAD_REQUEST,
            Json(MakeCallResponse::error(e.to_string())),
        )),
        Err(e) => {
            error!(error = %e, "failed to place outbound call");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MakeCallResponse::error(e.to_string())),
            ))
        }
    }
}

/// Lifecycle webhook posted by the telephony provider.
///
/// Fields we don't recognize are ignored; everything here is informational.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallStatusUpdate {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub call_status: Option<String>,
    #[serde(default)]
    pub call_duration: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<String>,
}

/// Record a call lifecycle update.
pub async fn call_status(Form(update): Form<CallStatusUpdate>) -> Json<Value> {
    info!(
        call_sid = update.call_sid.as_deref().unwrap_or("-"),
        call_status = update.call_status.as_deref().unwrap_or("-"),
        duration = update.call_duration.as_deref(),
        "call status update"
    );
    Json(json!({ "status": "received" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_call_response_shapes() {
        let ok = serde_json::to_value(MakeCallResponse::success("CA42".to_string())).unwrap();
        assert_eq!(ok, json!({"status": "success", "call_sid": "CA42"}));

        let err = serde_json::to_value(MakeCallResponse::error("boom")).unwrap();
        assert_eq!(err, json!({"status": "error", "error": "boom"}));
    }
}
