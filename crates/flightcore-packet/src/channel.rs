//! Logical channel identifiers carried in packet headers.
//!
//! `chanin` names the channel a packet arrived on and `chanout` the channel
//! that should carry it out. Zero means no specific channel.

use std::fmt;

/// A logical channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// No specific channel.
    pub const NONE: ChannelId = ChannelId(0);

    /// The ground-facing radio.
    pub const RADIO: ChannelId = ChannelId(1);

    /// The power-distribution unit.
    pub const PDU: ChannelId = ChannelId(2);

    /// The companion single-board computer.
    pub const COMPANION: ChannelId = ChannelId(3);

    /// Returns a human-readable name for the channel.
    pub fn name(self) -> &'static str {
        match self {
            Self::NONE => "none",
            Self::RADIO => "radio",
            Self::PDU => "pdu",
            Self::COMPANION => "companion",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl From<u8> for ChannelId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}
