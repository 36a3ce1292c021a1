//! WebSocket client for the realtime endpoint.
//!
//! The connection is header-authenticated during the upgrade and carries
//! JSON text frames both ways. After negotiation the connection is split
//! so the two relay pumps can own one half each.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, info, trace};
use url::Url;

use super::config::RealtimeModel;
use super::messages::ClientEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on the TCP + TLS + upgrade round trip.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures establishing the upstream connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid realtime endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("realtime endpoint URL has no host")]
    MissingHost,
    #[error("failed to build upgrade request: {0}")]
    Request(#[from] http::Error),
    #[error("authentication rejected by realtime endpoint (HTTP {0})")]
    Unauthorized(u16),
    #[error("websocket handshake failed: {0}")]
    Handshake(tungstenite::Error),
    #[error("upstream connect timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures on an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize client event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("websocket transport failure: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// An authenticated, upgraded connection to the realtime endpoint.
#[derive(Debug)]
pub struct RealtimeConnection {
    stream: WsStream,
}

impl RealtimeConnection {
    /// Connect and upgrade. `base_url` is the bare endpoint; the model is
    /// appended as a query parameter.
    pub async fn connect(
        base_url: &str,
        model: RealtimeModel,
        api_key: &str,
    ) -> Result<Self, ConnectionError> {
        let mut url = Url::parse(base_url)?;
        url.query_pairs_mut().append_pair("model", model.as_str());

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ConnectionError::MissingHost),
        };

        let request = http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {api_key}"))
            .header("OpenAI-Beta", "realtime=v1")
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .body(())?;

        let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request));
        let (stream, _response) = match connect.await {
            Ok(Ok(upgraded)) => upgraded,
            Ok(Err(tungstenite::Error::Http(response)))
                if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
            {
                return Err(ConnectionError::Unauthorized(response.status().as_u16()));
            }
            Ok(Err(e)) => return Err(ConnectionError::Handshake(e)),
            Err(_) => return Err(ConnectionError::Timeout(CONNECT_TIMEOUT)),
        };

        info!(model = model.as_str(), "connected to realtime endpoint");
        Ok(Self { stream })
    }

    pub async fn send_event(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let text = serde_json::to_string(event)?;
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Split into independently ownable halves for the two relay pumps.
    pub fn split(self) -> (RealtimeWriter, RealtimeReader) {
        let (write, read) = self.stream.split();
        (RealtimeWriter { write }, RealtimeReader { read })
    }
}

/// Write half: client events out.
pub struct RealtimeWriter {
    write: SplitSink<WsStream, Message>,
}

impl RealtimeWriter {
    pub async fn send_event(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let text = serde_json::to_string(event)?;
        self.write.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Best-effort close handshake. Double closes and dead peers are not
    /// errors at this point.
    pub async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
        let _ = self.write.close().await;
    }
}

/// Read half: server events in.
pub struct RealtimeReader {
    read: SplitStream<WsStream>,
}

impl RealtimeReader {
    /// Next text frame, skipping control and binary frames. `None` once
    /// the connection is finished.
    pub async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(payload)) => {
                    trace!(bytes = payload.len(), "ignoring binary frame from upstream");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "upstream sent close");
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_url_without_host() {
        let err = RealtimeConnection::connect("wss:///realtime", RealtimeModel::default(), "sk-x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::MissingHost | ConnectionError::InvalidUrl(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = RealtimeConnection::connect("not a url", RealtimeModel::default(), "sk-x")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidUrl(_)));
    }
}
