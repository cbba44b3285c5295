//! PDU serial wire format.
//!
//! Requests are three bytes `{type, switch, state}`; replies are either the
//! same shape or `{type, state[12]}` for telemetry. Every byte is shifted by
//! [`OFFSET`] on the wire to stay printable. Requests end with a NUL and a
//! newline; replies end with a newline.

use bytes::{BufMut, BytesMut};
use flightcore_packet::{Switch, SwitchState, TELEMETRY_SWITCHES};

use crate::error::PduError;

/// Added to every payload byte before transmission.
pub const OFFSET: u8 = 48;

/// Number of switch states in a telemetry reply.
pub const TELEMETRY_LEN: usize = TELEMETRY_SWITCHES.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    Nop = 0,
    CommandPing = 1,
    CommandSetSwitch = 2,
    CommandGetSwitchStatus = 3,
    DataPong = 4,
    DataSwitchStatus = 5,
    DataSwitchTelem = 6,
}

impl PduType {
    pub fn from_u8(value: u8) -> Option<PduType> {
        Some(match value {
            0 => PduType::Nop,
            1 => PduType::CommandPing,
            2 => PduType::CommandSetSwitch,
            3 => PduType::CommandGetSwitchStatus,
            4 => PduType::DataPong,
            5 => PduType::DataSwitchStatus,
            6 => PduType::DataSwitchTelem,
            _ => return None,
        })
    }
}

/// A request frame sent to the PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduRequest {
    pub kind: PduType,
    pub switch: Switch,
    pub state: SwitchState,
}

impl PduRequest {
    pub fn ping() -> Self {
        Self {
            kind: PduType::CommandPing,
            switch: Switch::None,
            state: SwitchState::Off,
        }
    }

    pub fn set_switch(switch: Switch, state: SwitchState) -> Self {
        Self {
            kind: PduType::CommandSetSwitch,
            switch,
            state,
        }
    }

    pub fn switch_status(switch: Switch) -> Self {
        Self {
            kind: PduType::CommandGetSwitchStatus,
            switch,
            state: SwitchState::Off,
        }
    }

    /// Append the offset-encoded frame and its terminator.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(5);
        dst.put_u8(self.kind as u8 + OFFSET);
        dst.put_u8(self.switch.id() + OFFSET);
        dst.put_u8(self.state as u8 + OFFSET);
        dst.put_u8(0);
        dst.put_u8(b'\n');
    }

    /// Decode one request line (terminator optional).
    pub fn decode(line: &[u8]) -> Result<Self, PduError> {
        let line = trim_line(line);
        let [kind, switch, state] = line else {
            return Err(malformed(format!("request of {} bytes", line.len())));
        };
        let kind = decode_type(*kind)?;
        let switch = Switch::from_id(unshift(*switch)?)
            .ok_or_else(|| malformed(format!("unknown switch byte {switch:#04x}")))?;
        Ok(Self {
            kind,
            switch,
            state: decode_state(*state)?,
        })
    }
}

/// A decoded reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduReply {
    Pong,
    SwitchStatus { switch: Switch, state: SwitchState },
    Telemetry([SwitchState; TELEMETRY_LEN]),
    /// A well-formed reply of a kind the engine never waits for.
    Other(PduType),
}

impl PduReply {
    /// Decode one reply line; trailing newline, carriage return and NUL are
    /// ignored.
    pub fn decode(line: &[u8]) -> Result<Self, PduError> {
        let line = trim_line(line);
        let Some((&kind, body)) = line.split_first() else {
            return Err(malformed("empty reply".to_string()));
        };
        match decode_type(kind)? {
            PduType::DataPong => Ok(PduReply::Pong),
            PduType::DataSwitchStatus => {
                let [switch, state, ..] = body else {
                    return Err(malformed("short switch status".to_string()));
                };
                let switch = Switch::from_id(unshift(*switch)?)
                    .ok_or_else(|| malformed(format!("unknown switch byte {switch:#04x}")))?;
                Ok(PduReply::SwitchStatus {
                    switch,
                    state: decode_state(*state)?,
                })
            }
            PduType::DataSwitchTelem => {
                if body.len() < TELEMETRY_LEN {
                    return Err(malformed(format!(
                        "telemetry with {} of {TELEMETRY_LEN} states",
                        body.len()
                    )));
                }
                let mut states = [SwitchState::Off; TELEMETRY_LEN];
                for (slot, byte) in states.iter_mut().zip(body) {
                    *slot = decode_state(*byte)?;
                }
                Ok(PduReply::Telemetry(states))
            }
            other => Ok(PduReply::Other(other)),
        }
    }

    /// Append the reply as the PDU board sends it.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            PduReply::Pong => {
                dst.put_slice(&[PduType::DataPong as u8 + OFFSET, OFFSET, OFFSET]);
            }
            PduReply::SwitchStatus { switch, state } => {
                dst.put_slice(&[
                    PduType::DataSwitchStatus as u8 + OFFSET,
                    switch.id() + OFFSET,
                    *state as u8 + OFFSET,
                ]);
            }
            PduReply::Telemetry(states) => {
                dst.put_u8(PduType::DataSwitchTelem as u8 + OFFSET);
                for state in states {
                    dst.put_u8(*state as u8 + OFFSET);
                }
            }
            PduReply::Other(kind) => {
                dst.put_slice(&[*kind as u8 + OFFSET, OFFSET, OFFSET]);
            }
        }
        dst.put_u8(b'\n');
    }
}

fn trim_line(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., last] = line {
        if matches!(last, b'\n' | b'\r' | 0) {
            line = rest;
        } else {
            break;
        }
    }
    line
}

fn unshift(byte: u8) -> Result<u8, PduError> {
    byte.checked_sub(OFFSET)
        .ok_or_else(|| malformed(format!("byte {byte:#04x} below offset")))
}

fn decode_type(byte: u8) -> Result<PduType, PduError> {
    let value = unshift(byte)?;
    PduType::from_u8(value).ok_or_else(|| malformed(format!("unknown type {value}")))
}

fn decode_state(byte: u8) -> Result<SwitchState, PduError> {
    let value = unshift(byte)?;
    SwitchState::from_u8(value).ok_or_else(|| malformed(format!("invalid state {value}")))
}

fn malformed(reason: String) -> PduError {
    PduError::MalformedReply(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bytes_are_offset_and_terminated() {
        let mut buf = BytesMut::new();
        PduRequest::set_switch(Switch::BURN_WIRE, SwitchState::On).encode(&mut buf);
        assert_eq!(&buf[..], &[b'2', b'>', b'1', 0, b'\n']);

        buf.clear();
        PduRequest::ping().encode(&mut buf);
        assert_eq!(&buf[..], b"100\0\n");
    }

    #[test]
    fn request_line_decodes_without_terminator() {
        let request = PduRequest::decode(b"3" as &[u8]).unwrap_err();
        assert!(matches!(request, PduError::MalformedReply(_)));
        let request = PduRequest::decode(&[b'3', b'1', b'0', 0]).unwrap();
        assert_eq!(request, PduRequest::switch_status(Switch::All));
    }

    #[test]
    fn switch_status_reply_decodes() {
        let reply = PduReply::decode(b"5>1\r\n").unwrap();
        assert_eq!(
            reply,
            PduReply::SwitchStatus {
                switch: Switch::Burn1,
                state: SwitchState::On
            }
        );
    }

    #[test]
    fn telemetry_reply_carries_twelve_states() {
        let reply = PduReply::decode(b"6010000000001\n").unwrap();
        let PduReply::Telemetry(states) = reply else {
            panic!("expected telemetry, got {reply:?}");
        };
        assert_eq!(states[0], SwitchState::Off);
        assert_eq!(states[1], SwitchState::On);
        assert_eq!(states[11], SwitchState::On);
        assert!(PduReply::decode(b"60101\n").is_err());
    }

    #[test]
    fn bytes_below_offset_are_malformed() {
        assert!(matches!(
            PduReply::decode(&[0x04, b'0', b'0']),
            Err(PduError::MalformedReply(_))
        ));
        assert!(PduReply::decode(b"\n").is_err());
        assert_eq!(PduReply::decode(b"1").unwrap(), PduReply::Other(PduType::CommandPing));
    }

    #[test]
    fn encoded_reply_decodes_to_itself() {
        let mut states = [SwitchState::Off; TELEMETRY_LEN];
        states[3] = SwitchState::On;
        for reply in [
            PduReply::Pong,
            PduReply::Telemetry(states),
            PduReply::SwitchStatus {
                switch: Switch::HEATER,
                state: SwitchState::Off,
            },
        ] {
            let mut buf = BytesMut::new();
            reply.encode(&mut buf);
            assert_eq!(buf.last(), Some(&b'\n'));
            assert_eq!(PduReply::decode(&buf).unwrap(), reply);
        }
    }
}
