//! Frame codec: wire envelopes in, `RelayEvent` out.
//!
//! Inbound frames follow the telephony media-stream envelope, tagged by
//! `event`:
//! - `{"event":"start","start":{"streamSid":"..."}}`
//! - `{"event":"media","media":{"payload":"<base64 audio>"}}`
//! - `{"event":"stop"}`
//!
//! Upstream frames are realtime API server events tagged by `type`.
//!
//! Decoding is total over well-formed JSON: unknown tags classify as
//! `Unrecognized` rather than erroring, so new peer events never break a
//! live call. Malformed frames yield a `DecodeError` the caller logs and
//! skips.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::realtime::messages::{ApiError, ServerEvent};

/// A frame that could not be decoded. Never fatal to a session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed telephony frame: {0}")]
    Inbound(#[source] serde_json::Error),
    #[error("malformed upstream frame: {0}")]
    Upstream(#[source] serde_json::Error),
}

/// Everything the relay engine reacts to, from either leg.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Telephony edge opened the media stream and assigned its identifier.
    StreamStart {
        stream_sid: String,
        call_sid: Option<String>,
    },
    /// One inbound audio payload, opaque text.
    MediaFrame { payload: String },
    /// Telephony edge ended the media stream.
    StreamStop,
    /// Finished agent transcript from upstream.
    UpstreamText { text: String },
    /// Agent audio to echo back onto the call.
    UpstreamAudioDelta { delta: String },
    /// Upstream event worth logging but not acting on.
    UpstreamControl { event: ServerEvent },
    /// Upstream reported an error; the session continues.
    Error { error: ApiError },
    /// Known envelope, unknown tag. Ignored.
    Unrecognized { event_type: String },
}

// ===== Inbound envelope =====

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum TelephonyFrame {
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Stop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartMeta {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "callSid", default)]
    call_sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

// ===== Outbound envelope =====

// Field order matches what the telephony edge emits for its own media
// frames: event, then streamSid, then media.
#[derive(Debug, Serialize)]
struct OutboundMediaFrame<'a> {
    event: &'static str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
    media: OutboundPayload<'a>,
}

#[derive(Debug, Serialize)]
struct OutboundPayload<'a> {
    payload: &'a str,
}

/// Decode one telephony frame.
pub fn decode_inbound(raw: &str) -> Result<RelayEvent, DecodeError> {
    let frame = serde_json::from_str::<TelephonyFrame>(raw).map_err(DecodeError::Inbound)?;
    Ok(match frame {
        TelephonyFrame::Start { start } => RelayEvent::StreamStart {
            stream_sid: start.stream_sid,
            call_sid: start.call_sid,
        },
        TelephonyFrame::Media { media } => RelayEvent::MediaFrame {
            payload: media.payload,
        },
        TelephonyFrame::Stop => RelayEvent::StreamStop,
        TelephonyFrame::Other => RelayEvent::Unrecognized {
            event_type: probe_tag(raw, "event"),
        },
    })
}

/// Decode one upstream frame and classify it for the relay.
pub fn decode_upstream(raw: &str) -> Result<RelayEvent, DecodeError> {
    let event = serde_json::from_str::<ServerEvent>(raw).map_err(DecodeError::Upstream)?;
    Ok(match event {
        ServerEvent::AudioDelta { delta } => RelayEvent::UpstreamAudioDelta { delta },
        ServerEvent::AudioTranscriptDone { transcript } => {
            RelayEvent::UpstreamText { text: transcript }
        }
        ServerEvent::Error { error } => RelayEvent::Error { error },
        ServerEvent::Unrecognized => RelayEvent::Unrecognized {
            event_type: probe_tag(raw, "type"),
        },
        other => RelayEvent::UpstreamControl { event: other },
    })
}

/// Encode an outbound media frame for the telephony edge. The stream
/// identifier is echoed exactly as the edge assigned it.
pub fn encode_outbound_media(
    stream_sid: &str,
    payload: &str,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundMediaFrame {
        event: "media",
        stream_sid,
        media: OutboundPayload { payload },
    })
}

/// Recover the tag of an unrecognized frame for logging. Falls back to
/// "unknown" when the tag is absent or not a string.
fn probe_tag(raw: &str, key: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| value.get(key).and_then(|tag| tag.as_str()).map(str::to_owned))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_start_frame() {
        let raw = r#"{"event":"start","sequenceNumber":"1","start":{"accountSid":"AC00","streamSid":"MZ123","callSid":"CA456","tracks":["inbound"],"mediaFormat":{"encoding":"audio/x-mulaw","sampleRate":8000,"channels":1}},"streamSid":"MZ123"}"#;
        match decode_inbound(raw).unwrap() {
            RelayEvent::StreamStart {
                stream_sid,
                call_sid,
            } => {
                assert_eq!(stream_sid, "MZ123");
                assert_eq!(call_sid.as_deref(), Some("CA456"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_media_frame() {
        let raw = r#"{"event":"media","sequenceNumber":"4","media":{"track":"inbound","chunk":"2","timestamp":"5","payload":"c291bmQ="},"streamSid":"MZ123"}"#;
        match decode_inbound(raw).unwrap() {
            RelayEvent::MediaFrame { payload } => assert_eq!(payload, "c291bmQ="),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_stop_frame_bare_and_full() {
        assert!(matches!(
            decode_inbound(r#"{"event":"stop"}"#).unwrap(),
            RelayEvent::StreamStop
        ));
        let full = r#"{"event":"stop","sequenceNumber":"9","stop":{"accountSid":"AC00","callSid":"CA456"},"streamSid":"MZ123"}"#;
        assert!(matches!(
            decode_inbound(full).unwrap(),
            RelayEvent::StreamStop
        ));
    }

    #[test]
    fn test_connected_and_mark_are_unrecognized() {
        for (raw, tag) in [
            (r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#, "connected"),
            (r#"{"event":"mark","mark":{"name":"cue-1"},"streamSid":"MZ123"}"#, "mark"),
        ] {
            match decode_inbound(raw).unwrap() {
                RelayEvent::Unrecognized { event_type } => assert_eq!(event_type, tag),
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_inbound_frames_error() {
        assert!(matches!(
            decode_inbound("not json at all"),
            Err(DecodeError::Inbound(_))
        ));
        // Known tag, required field missing.
        assert!(decode_inbound(r#"{"event":"media"}"#).is_err());
        assert!(decode_inbound(r#"{"event":"media","media":{}}"#).is_err());
        assert!(decode_inbound(r#"{"event":"start","start":{"callSid":"CA1"}}"#).is_err());
        // No tag at all.
        assert!(decode_inbound(r#"{"media":{"payload":"eHg="}}"#).is_err());
    }

    #[test]
    fn test_decode_upstream_audio_delta() {
        let raw = r#"{"type":"response.audio.delta","response_id":"r1","item_id":"i1","output_index":0,"content_index":0,"delta":"XYZ"}"#;
        match decode_upstream(raw).unwrap() {
            RelayEvent::UpstreamAudioDelta { delta } => assert_eq!(delta, "XYZ"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_upstream_transcript() {
        let raw = r#"{"type":"response.audio_transcript.done","transcript":"hello there"}"#;
        match decode_upstream(raw).unwrap() {
            RelayEvent::UpstreamText { text } => assert_eq!(text, "hello there"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_upstream_error_event() {
        let raw = r#"{"type":"error","error":{"type":"server_error","message":"overloaded"}}"#;
        match decode_upstream(raw).unwrap() {
            RelayEvent::Error { error } => assert_eq!(error.message, "overloaded"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_upstream_control_events() {
        let raw = r#"{"type":"session.created","session":{"id":"sess_1","model":"gpt-4o-realtime-preview-2024-10-01"}}"#;
        match decode_upstream(raw).unwrap() {
            RelayEvent::UpstreamControl { event } => {
                assert_eq!(event.event_type(), "session.created");
            }
            other => panic!("unexpected: {other:?}"),
        }
        let raw = r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":240,"item_id":"i9"}"#;
        match decode_upstream(raw).unwrap() {
            RelayEvent::UpstreamControl { event } => {
                assert_eq!(event.event_type(), "input_audio_buffer.speech_started");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_upstream_event_is_unrecognized() {
        let raw = r#"{"type":"response.text.delta","delta":"partial"}"#;
        match decode_upstream(raw).unwrap() {
            RelayEvent::Unrecognized { event_type } => {
                assert_eq!(event_type, "response.text.delta");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_upstream_frames_error() {
        assert!(matches!(
            decode_upstream("{{{"),
            Err(DecodeError::Upstream(_))
        ));
        assert!(decode_upstream(r#"{"no_type_here":true}"#).is_err());
        // Known tag, payload missing its required field.
        assert!(decode_upstream(r#"{"type":"response.audio.delta"}"#).is_err());
    }

    #[test]
    fn test_encode_outbound_media_exact_shape() {
        let frame = encode_outbound_media("A", "XYZ").unwrap();
        assert_eq!(
            frame,
            r#"{"event":"media","streamSid":"A","media":{"payload":"XYZ"}}"#
        );
    }

    #[test]
    fn test_encode_outbound_media_escapes_content() {
        let frame = encode_outbound_media("MZ\"1", "p").unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["streamSid"], "MZ\"1");
        assert_eq!(value["media"]["payload"], "p");
    }
}
