//! Typed view of command packets.
//!
//! The router decodes a packet's raw payload into a [`Command`] once, at the
//! dispatch boundary; downstream logic only sees typed fields.

use bytes::Bytes;

use crate::error::{PacketError, Result};
use crate::packet::{NodeId, Packet, PacketType};
use crate::switch::{Switch, SwitchState};

/// Payload byte that asks for a power-on regardless of battery voltage.
pub const FORCE_FLAG: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness check answered by the onboard computer.
    ObcPing,
    /// Collect and downlink every sensor beacon.
    ObcSendBeacon,
    /// Ask the companion computer to shut down.
    ObcHalt,
    /// Ping the PDU and report back.
    EpsCommunicate,
    /// Set one switch (or all switches) to a state.
    EpsSwitchName {
        switch: Switch,
        state: SwitchState,
        force: bool,
    },
    /// Report the state of one switch (or all switches).
    EpsSwitchStatus { switch: Switch },
    /// Take a picture on the companion computer.
    CameraCapture,
    /// Any type without a typed decoding.
    Unsupported(PacketType),
}

impl Command {
    /// Decode a packet's type and payload.
    pub fn decode(packet: &Packet) -> Result<Command> {
        let data = packet.payload.as_ref();
        let command = match packet.packet_type {
            PacketType::COMMAND_OBC_PING => Command::ObcPing,
            PacketType::COMMAND_OBC_SEND_BEACON => Command::ObcSendBeacon,
            PacketType::COMMAND_OBC_HALT => Command::ObcHalt,
            PacketType::COMMAND_EPS_COMMUNICATE => Command::EpsCommunicate,
            PacketType::COMMAND_CAMERA_CAPTURE => Command::CameraCapture,
            PacketType::COMMAND_EPS_SWITCH_NAME => {
                let [sw, state, rest @ ..] = data else {
                    return Err(malformed("switch", "expected [switch, state]"));
                };
                Command::EpsSwitchName {
                    switch: switch_from(*sw, "switch")?,
                    state: SwitchState::from_u8(*state)
                        .ok_or_else(|| malformed("switch", format!("invalid state {state}")))?,
                    force: rest.first() == Some(&FORCE_FLAG),
                }
            }
            PacketType::COMMAND_EPS_SWITCH_STATUS => Command::EpsSwitchStatus {
                switch: match data.first() {
                    Some(sw) => switch_from(*sw, "switch status")?,
                    None => Switch::All,
                },
            },
            other => Command::Unsupported(other),
        };
        Ok(command)
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Command::ObcPing => PacketType::COMMAND_OBC_PING,
            Command::ObcSendBeacon => PacketType::COMMAND_OBC_SEND_BEACON,
            Command::ObcHalt => PacketType::COMMAND_OBC_HALT,
            Command::EpsCommunicate => PacketType::COMMAND_EPS_COMMUNICATE,
            Command::EpsSwitchName { .. } => PacketType::COMMAND_EPS_SWITCH_NAME,
            Command::EpsSwitchStatus { .. } => PacketType::COMMAND_EPS_SWITCH_STATUS,
            Command::CameraCapture => PacketType::COMMAND_CAMERA_CAPTURE,
            Command::Unsupported(ty) => *ty,
        }
    }

    pub fn payload(&self) -> Bytes {
        match self {
            Command::EpsSwitchName {
                switch,
                state,
                force,
            } => {
                let mut data = vec![switch.id(), *state as u8];
                if *force {
                    data.push(FORCE_FLAG);
                }
                Bytes::from(data)
            }
            Command::EpsSwitchStatus { switch } => Bytes::from(vec![switch.id()]),
            _ => Bytes::new(),
        }
    }

    /// Build the packet carrying this command.
    pub fn to_packet(&self, origin: NodeId, destination: NodeId) -> Packet {
        Packet::new(self.packet_type(), origin, destination).with_payload(self.payload())
    }
}

fn switch_from(id: u8, kind: &'static str) -> Result<Switch> {
    Switch::from_id(id).ok_or_else(|| malformed(kind, format!("unknown switch id {id}")))
}

fn malformed(kind: &'static str, reason: impl Into<String>) -> PacketError {
    PacketError::MalformedCommand {
        kind,
        reason: reason.into(),
    }
}
