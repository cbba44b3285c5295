//! Telemetry beacon records.
//!
//! Every beacon starts with its type byte and a deci-second uptime stamp,
//! followed by little-endian packed readings. All beacons fit in a single
//! radio payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PacketError, Result};

pub const TEMPERATURE_SENSORS: usize = 7;
pub const CURRENT1_SENSORS: usize = 2;
pub const CURRENT2_SENSORS: usize = 3;
/// Switch beacon entries: the PDU telemetry set plus the companion line.
pub const SWITCH_BEACON_ENTRIES: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BeaconType {
    Temperature = 1,
    Current1 = 2,
    Current2 = 3,
    Imu = 4,
    Magnetometer = 5,
    Gps = 6,
    Switch = 7,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Temperature {
        sensors_c: [f32; TEMPERATURE_SENSORS],
        obc_c: f32,
    },
    Current1 {
        bus_voltage: [f32; CURRENT1_SENSORS],
        current: [f32; CURRENT1_SENSORS],
    },
    Current2 {
        bus_voltage: [f32; CURRENT2_SENSORS],
        current: [f32; CURRENT2_SENSORS],
    },
    Imu {
        accel: [f32; 3],
        gyro: [f32; 3],
        temperature_c: f32,
    },
    Magnetometer {
        field: [f32; 3],
    },
    Gps {
        latitude: f32,
        longitude: f32,
        speed: f32,
        angle: f32,
        altitude: f32,
        satellites: u8,
    },
    Switch {
        states: [u8; SWITCH_BEACON_ENTRIES],
    },
}

/// A timestamped sensor snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    /// Uptime in tenths of a second when the reading was taken.
    pub deci: u32,
    pub reading: Reading,
}

impl Beacon {
    pub fn new(deci: u32, reading: Reading) -> Self {
        Self { deci, reading }
    }

    pub fn kind(&self) -> BeaconType {
        match self.reading {
            Reading::Temperature { .. } => BeaconType::Temperature,
            Reading::Current1 { .. } => BeaconType::Current1,
            Reading::Current2 { .. } => BeaconType::Current2,
            Reading::Imu { .. } => BeaconType::Imu,
            Reading::Magnetometer { .. } => BeaconType::Magnetometer,
            Reading::Gps { .. } => BeaconType::Gps,
            Reading::Switch { .. } => BeaconType::Switch,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.kind() as u8);
        dst.put_u32_le(self.deci);
        match &self.reading {
            Reading::Temperature { sensors_c, obc_c } => {
                put_floats(dst, sensors_c);
                dst.put_f32_le(*obc_c);
            }
            Reading::Current1 {
                bus_voltage,
                current,
            } => {
                put_floats(dst, bus_voltage);
                put_floats(dst, current);
            }
            Reading::Current2 {
                bus_voltage,
                current,
            } => {
                put_floats(dst, bus_voltage);
                put_floats(dst, current);
            }
            Reading::Imu {
                accel,
                gyro,
                temperature_c,
            } => {
                put_floats(dst, accel);
                put_floats(dst, gyro);
                dst.put_f32_le(*temperature_c);
            }
            Reading::Magnetometer { field } => put_floats(dst, field),
            Reading::Gps {
                latitude,
                longitude,
                speed,
                angle,
                altitude,
                satellites,
            } => {
                put_floats(dst, &[*latitude, *longitude, *speed, *angle, *altitude]);
                dst.put_u8(*satellites);
            }
            Reading::Switch { states } => dst.put_slice(states),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(40);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Parse a beacon payload.
    pub fn decode(mut src: &[u8]) -> Result<Beacon> {
        if src.len() < 5 {
            return Err(malformed("too short for a beacon header"));
        }
        let kind = src.get_u8();
        let deci = src.get_u32_le();
        let needed = match kind {
            1 => 4 * (TEMPERATURE_SENSORS + 1),
            2 => 4 * 2 * CURRENT1_SENSORS,
            3 => 4 * 2 * CURRENT2_SENSORS,
            4 => 4 * 7,
            5 => 4 * 3,
            6 => 4 * 5 + 1,
            7 => SWITCH_BEACON_ENTRIES,
            other => return Err(malformed(format!("unknown beacon type {other}"))),
        };
        if src.len() != needed {
            return Err(malformed(format!(
                "beacon type {kind} needs {needed} body bytes, got {}",
                src.len()
            )));
        }

        let reading = match kind {
            1 => Reading::Temperature {
                sensors_c: get_floats(&mut src),
                obc_c: src.get_f32_le(),
            },
            2 => Reading::Current1 {
                bus_voltage: get_floats(&mut src),
                current: get_floats(&mut src),
            },
            3 => Reading::Current2 {
                bus_voltage: get_floats(&mut src),
                current: get_floats(&mut src),
            },
            4 => Reading::Imu {
                accel: get_floats(&mut src),
                gyro: get_floats(&mut src),
                temperature_c: src.get_f32_le(),
            },
            5 => Reading::Magnetometer {
                field: get_floats(&mut src),
            },
            6 => Reading::Gps {
                latitude: src.get_f32_le(),
                longitude: src.get_f32_le(),
                speed: src.get_f32_le(),
                angle: src.get_f32_le(),
                altitude: src.get_f32_le(),
                satellites: src.get_u8(),
            },
            _ => {
                let mut states = [0u8; SWITCH_BEACON_ENTRIES];
                src.copy_to_slice(&mut states);
                Reading::Switch { states }
            }
        };
        Ok(Beacon { deci, reading })
    }
}

fn put_floats(dst: &mut BytesMut, values: &[f32]) {
    for value in values {
        dst.put_f32_le(*value);
    }
}

fn get_floats<const N: usize>(src: &mut &[u8]) -> [f32; N] {
    let mut out = [0f32; N];
    for slot in &mut out {
        *slot = src.get_f32_le();
    }
    out
}

fn malformed(reason: impl Into<String>) -> PacketError {
    PacketError::MalformedCommand {
        kind: "beacon",
        reason: reason.into(),
    }
}
