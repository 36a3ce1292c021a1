//! Outbound telephony integration.

pub mod client;
pub mod twiml;

pub use client::{CallResource, TelephonyError, TwilioClient};
