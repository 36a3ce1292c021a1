//! Telephony REST client
//!
//! Places outbound calls through the provider's REST API. Each call is
//! created with TwiML that immediately connects the answered call's audio
//! to this server's media-stream endpoint.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::twiml;
use crate::utils::phone::{PhoneValidationError, validate_phone_number};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from outbound call placement
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("invalid phone number: {0}")]
    InvalidNumber(#[from] PhoneValidationError),

    #[error("telephony request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telephony API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Call resource returned by the provider on creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResource {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// REST client for the telephony provider.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            base_url: base_url.into(),
        }
    }

    /// Place an outbound call whose audio is streamed to `stream_url`.
    ///
    /// Call lifecycle updates (initiated, ringing, answered, completed) are
    /// posted to `status_callback`.
    pub async fn place_call(
        &self,
        to: &str,
        stream_url: &str,
        status_callback: &str,
    ) -> Result<CallResource, TelephonyError> {
        validate_phone_number(to)?;

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        );
        let twiml = twiml::connect_stream(stream_url);

        // Repeated StatusCallbackEvent keys subscribe to each lifecycle stage.
        let params: Vec<(&str, &str)> = vec![
            ("To", to),
            ("From", &self.from_number),
            ("CallerId", &self.from_number),
            ("Twiml", &twiml),
            ("Timeout", "60"),
            ("Trim", "trim-silence"),
            ("Record", "false"),
            ("StatusCallback", status_callback),
            ("StatusCallbackMethod", "POST"),
            ("StatusCallbackEvent", "initiated"),
            ("StatusCallbackEvent", "ringing"),
            ("StatusCallbackEvent", "answered"),
            ("StatusCallbackEvent", "completed"),
        ];

        debug!(to = %to, stream_url = %stream_url, "placing outbound call");

        let response = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let call = response.json::<CallResource>().await?;
        info!(call_sid = %call.sid, to = %to, "outbound call created");
        Ok(call)
    }
}
