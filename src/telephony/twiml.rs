//! TwiML generation
//!
//! The call instruction document handed to the telephony provider when a
//! call is placed. It tells the provider to open a media stream back to
//! this server over secure WebSocket.

/// Build the TwiML that connects a call's audio to the given stream URL.
///
/// The `<Parameter>` elements are surfaced to the stream consumer in the
/// start frame's custom parameters.
pub fn connect_stream(stream_url: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            "<Connect>",
            r#"<Stream url="{url}">"#,
            r#"<Parameter name="protocol" value="wss"/>"#,
            r#"<Parameter name="encryption" value="tls"/>"#,
            r#"<Parameter name="client" value="twilio"/>"#,
            "</Stream>",
            "</Connect>",
            "</Response>",
        ),
        url = escape_xml(stream_url)
    )
}

// Ampersand must go first; the later replacements introduce entities whose
// own `&` must not be escaped again.
fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_stream_document() {
        let twiml = connect_stream("wss://bridge.example.com/media-stream");
        assert!(twiml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(twiml.contains(r#"<Stream url="wss://bridge.example.com/media-stream">"#));
        assert!(twiml.contains(r#"<Parameter name="protocol" value="wss"/>"#));
        assert!(twiml.contains(r#"<Parameter name="encryption" value="tls"/>"#));
        assert!(twiml.contains(r#"<Parameter name="client" value="twilio"/>"#));
        assert!(twiml.ends_with("</Response>"));
    }

    #[test]
    fn test_url_is_escaped() {
        let twiml = connect_stream("wss://h.example/media-stream?a=1&b=\"x\"");
        assert!(twiml.contains("a=1&amp;b=&quot;x&quot;"));
        assert!(!twiml.contains("b=\"x\""));
    }
}
