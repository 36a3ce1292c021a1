//! The bidirectional audio relay.
//!
//! - `codec`: telephony/upstream envelopes to `RelayEvent`
//! - `buffer`: inbound audio batching with dual flush triggers
//! - `session`: per-call configuration and shared call state
//! - `negotiate`: ordered upstream session configuration
//! - `engine`: lifecycle state machine and the two pumps

pub mod buffer;
pub mod codec;
pub mod engine;
pub mod negotiate;
pub mod session;

pub use buffer::AudioBuffer;
pub use codec::{DecodeError, RelayEvent, decode_inbound, decode_upstream, encode_outbound_media};
pub use engine::{RelayEngine, RelayError, RelayState};
pub use negotiate::{NegotiationError, negotiate};
pub use session::{CallSession, RelayConfig};
