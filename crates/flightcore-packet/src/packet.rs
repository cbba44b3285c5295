use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::channel::ChannelId;
use crate::error::{PacketError, Result};

/// Logical endpoints a packet can travel between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeId {
    Ground = 1,
    Obc = 2,
    Companion = 3,
}

impl NodeId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ground => "ground",
            Self::Obc => "obc",
            Self::Companion => "companion",
        }
    }
}

impl TryFrom<u8> for NodeId {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Ground),
            2 => Ok(Self::Obc),
            3 => Ok(Self::Companion),
            other => Err(PacketError::UnknownNode(other)),
        }
    }
}

impl FromStr for NodeId {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ground" => Ok(Self::Ground),
            "obc" => Ok(Self::Obc),
            "companion" => Ok(Self::Companion),
            other => other
                .parse::<u8>()
                .map_err(|_| PacketError::UnknownNode(0))
                .and_then(Self::try_from),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packet kind tag. Open-ended: unknown values travel through the router
/// untouched and are dropped where no handler exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketType(pub u16);

impl PacketType {
    pub const BLANK: PacketType = PacketType(0x0000);

    pub const DATA_OBC_BEACON: PacketType = PacketType(0x0010);
    pub const DATA_OBC_PONG: PacketType = PacketType(0x0011);
    pub const DATA_OBC_RESPONSE: PacketType = PacketType(0x0012);
    pub const DATA_EPS_RESPONSE: PacketType = PacketType(0x0020);
    pub const DATA_RADIO_RESPONSE: PacketType = PacketType(0x0030);
    pub const DATA_ADCS_RESPONSE: PacketType = PacketType(0x0040);

    pub const COMMAND_OBC_PING: PacketType = PacketType(0x0100);
    pub const COMMAND_OBC_SEND_BEACON: PacketType = PacketType(0x0101);
    pub const COMMAND_OBC_HALT: PacketType = PacketType(0x0102);
    pub const COMMAND_EPS_COMMUNICATE: PacketType = PacketType(0x0110);
    pub const COMMAND_EPS_SWITCH_NAME: PacketType = PacketType(0x0111);
    pub const COMMAND_EPS_SWITCH_STATUS: PacketType = PacketType(0x0112);
    pub const COMMAND_CAMERA_CAPTURE: PacketType = PacketType(0x0120);

    const NAMED: [(PacketType, &'static str); 14] = [
        (Self::BLANK, "Blank"),
        (Self::DATA_OBC_BEACON, "DataObcBeacon"),
        (Self::DATA_OBC_PONG, "DataObcPong"),
        (Self::DATA_OBC_RESPONSE, "DataObcResponse"),
        (Self::DATA_EPS_RESPONSE, "DataEpsResponse"),
        (Self::DATA_RADIO_RESPONSE, "DataRadioResponse"),
        (Self::DATA_ADCS_RESPONSE, "DataAdcsResponse"),
        (Self::COMMAND_OBC_PING, "CommandObcPing"),
        (Self::COMMAND_OBC_SEND_BEACON, "CommandObcSendBeacon"),
        (Self::COMMAND_OBC_HALT, "CommandObcHalt"),
        (Self::COMMAND_EPS_COMMUNICATE, "CommandEpsCommunicate"),
        (Self::COMMAND_EPS_SWITCH_NAME, "CommandEpsSwitchName"),
        (Self::COMMAND_EPS_SWITCH_STATUS, "CommandEpsSwitchStatus"),
        (Self::COMMAND_CAMERA_CAPTURE, "CommandCameraCapture"),
    ];

    /// Returns the symbolic name, or `None` for unassigned values.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, name)| *name)
    }

    /// Commands travel uplink; everything below the command range is data.
    pub fn is_command(self) -> bool {
        self.0 >= Self::COMMAND_OBC_PING.0
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Parses a symbolic name (case-insensitive) or a decimal/`0x` hex value.
impl FromStr for PacketType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some((ty, _)) = Self::NAMED
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
        {
            return Ok(*ty);
        }
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16),
            None => s.parse::<u16>(),
        };
        parsed
            .map(PacketType)
            .map_err(|_| format!("unknown packet type: {s}"))
    }
}

/// The universal message unit moved between channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub origin: NodeId,
    pub destination: NodeId,
    pub channel_in: ChannelId,
    pub channel_out: ChannelId,
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet with no channel hints and an empty payload.
    pub fn new(packet_type: PacketType, origin: NodeId, destination: NodeId) -> Self {
        Self {
            packet_type,
            origin,
            destination,
            channel_in: ChannelId::NONE,
            channel_out: ChannelId::NONE,
            payload: Bytes::new(),
        }
    }

    pub fn with_channels(mut self, channel_in: ChannelId, channel_out: ChannelId) -> Self {
        self.channel_in = channel_in;
        self.channel_out = channel_out;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Build a response travelling back the way this packet came.
    ///
    /// Origin and destination swap, and the reply leaves on the channel the
    /// request arrived on.
    pub fn reply(&self, packet_type: PacketType) -> Packet {
        Packet {
            packet_type,
            origin: self.destination,
            destination: self.origin,
            channel_in: ChannelId::NONE,
            channel_out: self.channel_in,
            payload: Bytes::new(),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} in={} out={} len={}",
            self.packet_type,
            self.origin,
            self.destination,
            self.channel_in,
            self.channel_out,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_match_wire_values() {
        assert_eq!(NodeId::Ground as u8, 1);
        assert_eq!(NodeId::Obc as u8, 2);
        assert_eq!(NodeId::Companion as u8, 3);
        assert!(matches!(NodeId::try_from(0), Err(PacketError::UnknownNode(0))));
        assert!(matches!(NodeId::try_from(4), Err(PacketError::UnknownNode(4))));
    }

    #[test]
    fn node_ids_parse_from_names_and_numbers() {
        assert_eq!("Ground".parse::<NodeId>().unwrap(), NodeId::Ground);
        assert_eq!("3".parse::<NodeId>().unwrap(), NodeId::Companion);
        assert!("moon".parse::<NodeId>().is_err());
    }

    #[test]
    fn packet_type_parses_names_and_hex() {
        assert_eq!(
            "commandobcping".parse::<PacketType>().unwrap(),
            PacketType::COMMAND_OBC_PING
        );
        assert_eq!("0x800".parse::<PacketType>().unwrap(), PacketType(0x800));
        assert_eq!("17".parse::<PacketType>().unwrap(), PacketType::DATA_OBC_PONG);
        assert!("bogus".parse::<PacketType>().is_err());
    }

    #[test]
    fn packet_type_display_falls_back_to_hex() {
        assert_eq!(PacketType::DATA_OBC_BEACON.to_string(), "DataObcBeacon");
        assert_eq!(PacketType(0x800).to_string(), "0x0800");
        assert!(PacketType::COMMAND_CAMERA_CAPTURE.is_command());
        assert!(!PacketType::DATA_EPS_RESPONSE.is_command());
    }

    #[test]
    fn reply_swaps_endpoints_and_returns_on_arrival_channel() {
        let request = Packet::new(PacketType::COMMAND_OBC_PING, NodeId::Ground, NodeId::Obc)
            .with_channels(ChannelId::RADIO, ChannelId::NONE)
            .with_payload(&b"ping"[..]);
        let reply = request.reply(PacketType::DATA_OBC_PONG);
        assert_eq!(reply.origin, NodeId::Obc);
        assert_eq!(reply.destination, NodeId::Ground);
        assert_eq!(reply.channel_out, ChannelId::RADIO);
        assert!(reply.payload.is_empty());
    }
}
