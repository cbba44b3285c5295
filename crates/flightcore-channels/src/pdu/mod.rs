//! Power-distribution unit: wire format, request/reply engine and channel.

pub mod channel;
pub mod engine;
pub mod sim;
pub mod wire;

pub use channel::{PduChannel, STATE_UNKNOWN};
pub use engine::{PduEngine, SwitchCache};
pub use sim::SimPdu;
pub use wire::{PduReply, PduRequest, PduType};
