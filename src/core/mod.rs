pub mod realtime;
pub mod relay;

// Re-export commonly used types for convenience
pub use realtime::{
    ClientEvent, ConnectionError, RealtimeConnection, RealtimeModel, RealtimeVoice, ServerEvent,
    TransportError,
};
pub use relay::{
    AudioBuffer, CallSession, DecodeError, RelayConfig, RelayEngine, RelayError, RelayEvent,
    RelayState,
};
