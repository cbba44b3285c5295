//! Sensor collaborators on the I2C bus.

use std::sync::{Arc, Mutex, PoisonError};

use flightcore_packet::Beacon;

/// The sensor suite as seen by the router and the PDU channel.
///
/// Implementations are driven only from inside an I2C bus transaction.
pub trait Sensors: Send {
    /// Battery pack voltage, if the monitor answered.
    fn battery_voltage(&mut self) -> Option<f32>;

    /// Battery board temperature in Celsius, if the probe answered.
    fn battery_temperature_c(&mut self) -> Option<f32>;

    /// Read every enabled sensor and produce its beacon.
    fn beacons(&mut self, deci: u32) -> Vec<Beacon>;
}

#[derive(Debug, Default)]
struct Readings {
    voltage: Option<f32>,
    temperature_c: Option<f32>,
    beacons: Vec<Beacon>,
    beacon_reads: usize,
}

/// Scriptable sensors for host runs and tests. Clones share readings.
#[derive(Debug, Clone, Default)]
pub struct SimSensors {
    readings: Arc<Mutex<Readings>>,
}

impl SimSensors {
    pub fn new(voltage: f32, temperature_c: f32) -> Self {
        let sensors = Self::default();
        sensors.set_voltage(Some(voltage));
        sensors.set_temperature(Some(temperature_c));
        sensors
    }

    fn with<R>(&self, f: impl FnOnce(&mut Readings) -> R) -> R {
        f(&mut self.readings.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_voltage(&self, voltage: Option<f32>) {
        self.with(|r| r.voltage = voltage);
    }

    pub fn set_temperature(&self, temperature_c: Option<f32>) {
        self.with(|r| r.temperature_c = temperature_c);
    }

    /// Beacons returned (with fresh timestamps) on every collection.
    pub fn set_beacons(&self, beacons: Vec<Beacon>) {
        self.with(|r| r.beacons = beacons);
    }

    /// How many times beacons were collected.
    pub fn beacon_reads(&self) -> usize {
        self.with(|r| r.beacon_reads)
    }
}

impl Sensors for SimSensors {
    fn battery_voltage(&mut self) -> Option<f32> {
        self.with(|r| r.voltage)
    }

    fn battery_temperature_c(&mut self) -> Option<f32> {
        self.with(|r| r.temperature_c)
    }

    fn beacons(&mut self, deci: u32) -> Vec<Beacon> {
        self.with(|r| {
            r.beacon_reads += 1;
            r.beacons
                .iter()
                .cloned()
                .map(|mut beacon| {
                    beacon.deci = deci;
                    beacon
                })
                .collect()
        })
    }
}
