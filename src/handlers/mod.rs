//! HTTP and WebSocket request handlers
//!
//! This module organizes all handlers into logical groups:
//! - `api` - Health check endpoint
//! - `calls` - Outbound call placement and status webhooks
//! - `media_stream` - Telephony media-stream WebSocket relay

pub mod api;
pub mod calls;
pub mod media_stream;

// Re-export commonly used handlers for convenient access
pub use media_stream::media_stream_handler;
