//! Relay engine: runs one call end to end.
//!
//! Lifecycle per session:
//!
//! ```text
//! Idle -> Connecting -> Negotiating -> Active -> Draining -> Closed
//!             |              |
//!             +-> Closed     +-> Closed
//! ```
//!
//! While Active, two pumps run as separate tasks. The inbound pump reads
//! telephony frames, batches media payloads and forwards combined chunks
//! upstream. The outbound pump reads upstream events and enqueues agent
//! audio for the telephony writer task. The queue between them is bounded;
//! when it fills, the outbound pump awaits capacity, which pushes the
//! backpressure onto the upstream read instead of buffering without
//! bound. Either pump ending, cleanly or not, cancels the shared token so
//! the other side wakes out of its pending read and the session drains.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::core::realtime::client::{
    ConnectionError, RealtimeConnection, RealtimeReader, RealtimeWriter, TransportError,
};
use crate::core::realtime::messages::{ClientEvent, ServerEvent};
use crate::core::relay::buffer::AudioBuffer;
use crate::core::relay::codec::{self, RelayEvent};
use crate::core::relay::negotiate::{NegotiationError, negotiate};
use crate::core::relay::session::{CallSession, RelayConfig};

/// Default bound on the outbound media queue, in frames.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Bound on waiting for the surviving pump and the writer while draining.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Session-fatal relay failures. Decode problems are not among them; the
/// pumps log and skip those per frame.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("session negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error("upstream relay failure: {0}")]
    Upstream(#[from] TransportError),
    #[error("telephony relay failure: {0}")]
    Telephony(#[from] axum::Error),
    #[error("failed to encode outbound media frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Relay lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Negotiating,
    Active,
    Draining,
    Closed,
}

impl RelayState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Negotiating => "negotiating",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }

    /// Whether `next` is a legal successor of `self`. Connecting and
    /// Negotiating may fail straight to Closed; a live session always
    /// drains first.
    pub fn can_transition_to(self, next: RelayState) -> bool {
        use RelayState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Negotiating)
                | (Connecting, Closed)
                | (Negotiating, Active)
                | (Negotiating, Closed)
                | (Active, Draining)
                | (Draining, Closed)
        )
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the telephony writer task is asked to do next.
enum OutboundFrame {
    Media(String),
    Close,
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    StreamStop,
    InboundClosed,
    UpstreamClosed,
    Cancelled,
}

/// Drives one call: connects upstream, negotiates, pumps both directions,
/// drains on the first failure or close from either side.
pub struct RelayEngine {
    config: RelayConfig,
    state: RelayState,
}

impl RelayEngine {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            state: RelayState::Idle,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn transition(&mut self, next: RelayState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "unexpected relay state transition");
        }
        debug!(from = %self.state, to = %next, "relay state");
        self.state = next;
    }

    /// Run the session to completion. Consumes the engine; a new call gets
    /// a new engine.
    pub async fn run(mut self, mut socket: WebSocket) -> Result<(), RelayError> {
        self.transition(RelayState::Connecting);
        let mut upstream = match RealtimeConnection::connect(
            &self.config.realtime_url,
            self.config.model,
            &self.config.api_key,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                let _ = socket.send(Message::Close(None)).await;
                self.transition(RelayState::Closed);
                return Err(e.into());
            }
        };

        self.transition(RelayState::Negotiating);
        if let Err(e) = negotiate(&mut upstream, &self.config).await {
            let (mut up_writer, _) = upstream.split();
            up_writer.close().await;
            let _ = socket.send(Message::Close(None)).await;
            self.transition(RelayState::Closed);
            return Err(e.into());
        }

        self.transition(RelayState::Active);
        let result = self.pump(socket, upstream).await;
        self.transition(RelayState::Closed);
        result
    }

    async fn pump(
        &mut self,
        socket: WebSocket,
        upstream: RealtimeConnection,
    ) -> Result<(), RelayError> {
        let session = Arc::new(CallSession::new());
        let cancel = CancellationToken::new();
        let (up_writer, up_reader) = upstream.split();
        let (tele_sink, tele_stream) = socket.split();

        let (out_tx, out_rx) =
            mpsc::channel::<OutboundFrame>(self.config.outbound_queue_capacity.max(1));

        let mut writer_task = tokio::spawn(telephony_writer(tele_sink, out_rx));
        let mut outbound_task = tokio::spawn(outbound_pump(
            up_reader,
            out_tx.clone(),
            session.clone(),
            cancel.clone(),
        ));

        // The inbound pump runs on this task; its return is what flips the
        // session into Draining.
        let inbound_result =
            inbound_pump(tele_stream, up_writer, session.clone(), cancel.clone(), &self.config)
                .await;
        if let Ok(end) = &inbound_result {
            debug!(end = ?end, "inbound pump finished");
        }

        self.transition(RelayState::Draining);
        cancel.cancel();

        let outbound_result: Result<PumpEnd, RelayError> =
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut outbound_task).await {
                Ok(Ok(result)) => {
                    if let Ok(end) = &result {
                        debug!(end = ?end, "outbound pump finished");
                    }
                    result
                }
                Ok(Err(join_error)) => {
                    warn!(error = %join_error, "outbound pump ended abnormally");
                    Ok(PumpEnd::Cancelled)
                }
                Err(_) => {
                    outbound_task.abort();
                    warn!("outbound pump did not stop within the drain timeout");
                    Ok(PumpEnd::Cancelled)
                }
            };

        // Let the writer flush what is queued, then close the telephony
        // socket. A full queue at this point is tolerable; the writer is
        // aborted after the drain timeout either way.
        let _ = out_tx.try_send(OutboundFrame::Close);
        drop(out_tx);
        let writer_result = match tokio::time::timeout(DRAIN_TIMEOUT, &mut writer_task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "telephony writer ended abnormally");
                Ok(())
            }
            Err(_) => {
                writer_task.abort();
                warn!("telephony writer did not stop within the drain timeout");
                Ok(())
            }
        };

        let stream_sid = session.stream_sid().await;
        info!(
            stream_sid = ?stream_sid,
            uptime_ms = session.uptime().as_millis() as u64,
            "relay session drained"
        );

        match (inbound_result, outbound_result) {
            (Err(e), _) => Err(e),
            (_, Err(e)) => Err(e),
            (Ok(_), Ok(_)) => writer_result.map_err(RelayError::Telephony),
        }
    }
}

/// Telephony stream in, upstream audio out. Owns the audio buffer and the
/// upstream write half; records the stream identifier on start.
async fn inbound_pump(
    mut stream: SplitStream<WebSocket>,
    mut up_writer: RealtimeWriter,
    session: Arc<CallSession>,
    cancel: CancellationToken,
    config: &RelayConfig,
) -> Result<PumpEnd, RelayError> {
    let result = inbound_loop(&mut stream, &mut up_writer, &session, &cancel, config).await;
    cancel.cancel();
    up_writer.close().await;
    result
}

async fn inbound_loop(
    stream: &mut SplitStream<WebSocket>,
    up_writer: &mut RealtimeWriter,
    session: &CallSession,
    cancel: &CancellationToken,
    config: &RelayConfig,
) -> Result<PumpEnd, RelayError> {
    let mut buffer = AudioBuffer::new(config.flush_max_chunks, config.flush_max_bytes);
    // Media may legally arrive ahead of the start frame. It still flows
    // through the buffer, but chunks flushed before the stream identifier
    // is known are held here and sent once start arrives.
    let mut held: Vec<String> = Vec::new();
    let mut started = false;

    let end = loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            message = stream.next() => message,
        };
        let Some(message) = message else {
            break PumpEnd::InboundClosed;
        };
        let raw = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break PumpEnd::InboundClosed,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
        };

        match codec::decode_inbound(raw.as_str()) {
            Ok(RelayEvent::StreamStart {
                stream_sid,
                call_sid,
            }) => {
                info!(stream_sid = %stream_sid, call_sid = ?call_sid, "media stream started");
                session.set_stream_sid(stream_sid).await;
                started = true;
                for combined in held.drain(..) {
                    forward_audio(up_writer, combined, config.commit_on_flush).await?;
                }
            }
            Ok(RelayEvent::MediaFrame { payload }) => {
                if let Some(combined) = buffer.push(payload) {
                    if started {
                        forward_audio(up_writer, combined, config.commit_on_flush).await?;
                    } else {
                        held.push(combined);
                    }
                }
            }
            Ok(RelayEvent::StreamStop) => {
                debug!("media stream stopped by telephony edge");
                break PumpEnd::StreamStop;
            }
            Ok(RelayEvent::Unrecognized { event_type }) => {
                trace!(event = %event_type, "ignoring telephony event");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "skipping undecodable telephony frame");
            }
        }
    };

    // Push the partial batch upstream before closing so every buffered
    // byte is accounted for. Pointless when the upstream side is the one
    // that went away, or when the stream never delivered its start frame.
    if started && matches!(end, PumpEnd::StreamStop | PumpEnd::InboundClosed) {
        if let Some(rest) = buffer.flush() {
            forward_audio(up_writer, rest, config.commit_on_flush).await?;
        }
    }

    Ok(end)
}

async fn forward_audio(
    up_writer: &mut RealtimeWriter,
    combined: String,
    commit: bool,
) -> Result<(), RelayError> {
    trace!(bytes = combined.len(), "forwarding combined audio chunk upstream");
    up_writer.send_event(&ClientEvent::append(combined)).await?;
    if commit {
        up_writer
            .send_event(&ClientEvent::InputAudioBufferCommit)
            .await?;
    }
    Ok(())
}

/// Upstream events in, telephony media frames out. Reads the stream
/// identifier recorded by the inbound pump; deltas arriving before the
/// start frame have nowhere to go and are dropped.
async fn outbound_pump(
    mut up_reader: RealtimeReader,
    out_tx: mpsc::Sender<OutboundFrame>,
    session: Arc<CallSession>,
    cancel: CancellationToken,
) -> Result<PumpEnd, RelayError> {
    let result = outbound_loop(&mut up_reader, &out_tx, &session, &cancel).await;
    cancel.cancel();
    result
}

async fn outbound_loop(
    up_reader: &mut RealtimeReader,
    out_tx: &mpsc::Sender<OutboundFrame>,
    session: &CallSession,
    cancel: &CancellationToken,
) -> Result<PumpEnd, RelayError> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(PumpEnd::Cancelled),
            next = up_reader.next_text() => next,
        };
        let Some(next) = next else {
            return Ok(PumpEnd::UpstreamClosed);
        };
        let raw = next?;

        match codec::decode_upstream(&raw) {
            Ok(RelayEvent::UpstreamAudioDelta { delta }) => {
                let Some(stream_sid) = session.stream_sid().await else {
                    debug!("dropping agent audio delta received before stream start");
                    continue;
                };
                let frame = codec::encode_outbound_media(&stream_sid, &delta)?;
                if out_tx.send(OutboundFrame::Media(frame)).await.is_err() {
                    return Ok(PumpEnd::InboundClosed);
                }
            }
            Ok(RelayEvent::UpstreamText { text }) => {
                info!(transcript = %text, "agent transcript");
            }
            Ok(RelayEvent::Error { error }) => {
                warn!(
                    code = ?error.code,
                    error_type = ?error.error_type,
                    "upstream error event: {}",
                    error.message
                );
            }
            Ok(RelayEvent::UpstreamControl { event }) => log_control_event(&event),
            Ok(RelayEvent::Unrecognized { event_type }) => {
                trace!(event = %event_type, "ignoring upstream event");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "skipping undecodable upstream frame");
            }
        }
    }
}

/// Writer task for the telephony leg. Draining the bounded queue here
/// keeps sink access single-owner.
async fn telephony_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundFrame>,
) -> Result<(), axum::Error> {
    while let Some(frame) = rx.recv().await {
        match frame {
            OutboundFrame::Media(text) => sink.send(Message::Text(text.into())).await?,
            OutboundFrame::Close => break,
        }
    }
    // The peer may already be gone; close failures are not interesting.
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    Ok(())
}

fn log_control_event(event: &ServerEvent) {
    match event {
        ServerEvent::SessionCreated { session } => {
            info!(session_id = %session.id, model = ?session.model, "upstream session created");
        }
        ServerEvent::SessionUpdated { session } => {
            debug!(session_id = %session.id, "upstream session updated");
        }
        ServerEvent::SpeechStarted { audio_start_ms } => {
            debug!(at_ms = ?audio_start_ms, "caller speech started");
        }
        ServerEvent::SpeechStopped { audio_end_ms } => {
            debug!(at_ms = ?audio_end_ms, "caller speech stopped");
        }
        ServerEvent::InputAudioBufferCommitted { item_id } => {
            debug!(item = ?item_id, "upstream committed input audio");
        }
        ServerEvent::ResponseDone { response } => {
            info!(response_id = ?response.id, status = ?response.status, "agent response finished");
        }
        ServerEvent::RateLimitsUpdated { rate_limits } => {
            for limit in rate_limits {
                debug!(name = %limit.name, remaining = ?limit.remaining, "rate limit updated");
            }
        }
        other => {
            debug!(event = other.event_type(), "upstream event");
        }
    }
}
