//! Session negotiator: configures the upstream session before any audio
//! flows.
//!
//! The sequence is fixed. First `session.update` carries voice,
//! instructions, audio formats and turn detection. Then, when configured,
//! an opaque context payload, a system priming item, and a `response.create`
//! kickoff so the agent opens the conversation. Sends are awaited in
//! order; provider acknowledgments arrive later on the reader and are
//! handled by the outbound pump.

use thiserror::Error;
use tracing::{debug, info};

use crate::core::realtime::client::{RealtimeConnection, TransportError};
use crate::core::realtime::messages::{ClientEvent, ConversationItem, SessionConfig};
use crate::core::relay::session::RelayConfig;

/// Negotiation failure, naming the step whose send failed.
#[derive(Debug, Error)]
#[error("session negotiation failed at {step}: {source}")]
pub struct NegotiationError {
    pub step: &'static str,
    #[source]
    pub source: TransportError,
}

/// Run the ordered negotiation sequence on a fresh connection.
pub async fn negotiate(
    conn: &mut RealtimeConnection,
    config: &RelayConfig,
) -> Result<(), NegotiationError> {
    send(conn, "session.update", build_session_update(config)).await?;

    if let Some(context) = &config.context {
        send(
            conn,
            "conversation.context.set",
            ClientEvent::ConversationContextSet {
                context: context.clone(),
            },
        )
        .await?;
    }

    if let Some(priming) = &config.priming {
        send(
            conn,
            "conversation.item.create",
            ClientEvent::ConversationItemCreate {
                item: ConversationItem::system_text(priming.clone()),
            },
        )
        .await?;
    }

    if config.kickoff_response {
        send(conn, "response.create", ClientEvent::ResponseCreate).await?;
    }

    info!(
        voice = config.voice.as_str(),
        model = config.model.as_str(),
        "session negotiated"
    );
    Ok(())
}

async fn send(
    conn: &mut RealtimeConnection,
    step: &'static str,
    event: ClientEvent,
) -> Result<(), NegotiationError> {
    debug!(step, "sending negotiation event");
    conn.send_event(&event)
        .await
        .map_err(|source| NegotiationError { step, source })
}

fn build_session_update(config: &RelayConfig) -> ClientEvent {
    ClientEvent::SessionUpdate {
        session: SessionConfig {
            modalities: Some(
                config
                    .modalities
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            ),
            instructions: Some(config.instructions.clone()),
            voice: Some(config.voice),
            input_audio_format: Some(config.input_audio_format),
            output_audio_format: Some(config.output_audio_format),
            turn_detection: config.turn_detection.clone(),
            temperature: config.temperature,
        },
    }
}
