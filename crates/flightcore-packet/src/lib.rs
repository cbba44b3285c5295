//! Packet model and wire codecs for the flight core.
//!
//! A [`Packet`] carries a type tag, origin/destination nodes, input/output
//! channel hints and an opaque payload. It has two wire encodings:
//! - the **wrapped** form for the radio: 8-byte header, payload, CRC-16
//! - the **framed** form for the companion link: the wrapped form with SLIP
//!   escaping between `0xC0` delimiters
//!
//! Payloads are decoded into typed [`Command`]s and [`Beacon`]s at the edges.

pub mod beacon;
pub mod channel;
pub mod codec;
pub mod command;
pub mod error;
pub mod packet;
pub mod slip;
pub mod stream;
pub mod switch;

pub use beacon::{Beacon, BeaconType, Reading};
pub use channel::ChannelId;
pub use codec::{
    unwrap, wrap, wrap_to_bytes, HEADER_SIZE, RADIO_MAX_FRAME, RADIO_MAX_PAYLOAD, TRAILER_SIZE,
};
pub use command::Command;
pub use error::{PacketError, Result};
pub use packet::{NodeId, Packet, PacketType};
pub use slip::{deframe, frame, DEFAULT_MAX_FRAME};
pub use stream::{ReadBatch, SlipStream};
pub use switch::{Switch, SwitchState, PHYSICAL_SWITCHES, TELEMETRY_SWITCHES};
