//! Shared context handed to every channel and the router.
//!
//! Built once at boot and shared behind an `Arc`: the four queues, the
//! scheduler registry, the sensor bus, the companion enable line, the switch
//! cache and the deployment-mode flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use flightcore_hal::{BusLock, Clock, OutputPin};
use flightcore_packet::ChannelId;

use crate::config::FlightConfig;
use crate::pdu::SwitchCache;
use crate::queue::ChannelQueue;
use crate::scheduler::Scheduler;
use crate::sensors::Sensors;

/// Name of the sensor bus lock.
pub const SENSOR_BUS: &str = "i2c1";

/// An enable line shared between the router (power on) and the channel it
/// powers (orderly power off).
pub struct PowerLine {
    name: &'static str,
    pin: Mutex<Box<dyn OutputPin>>,
}

impl PowerLine {
    pub fn new(name: &'static str, pin: Box<dyn OutputPin>) -> Self {
        Self {
            name,
            pin: Mutex::new(pin),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Box<dyn OutputPin>) -> R) -> R {
        f(&mut self.pin.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Assert the line and report whether it reads back asserted.
    pub fn enable(&self) -> bool {
        self.with(|pin| {
            pin.set_high();
            pin.is_set_high()
        })
    }

    pub fn disable(&self) {
        self.with(|pin| pin.set_low());
    }

    pub fn is_enabled(&self) -> bool {
        self.with(|pin| pin.is_set_high())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub struct Backplane {
    /// Packets waiting for the router.
    pub inbound: ChannelQueue,
    pub radio: ChannelQueue,
    pub pdu: ChannelQueue,
    pub companion: ChannelQueue,
    pub scheduler: Scheduler,
    pub clock: Arc<dyn Clock>,
    pub sensors: BusLock<Box<dyn Sensors>>,
    pub companion_power: PowerLine,
    pub switches: Arc<SwitchCache>,
    deployment_mode: AtomicBool,
}

impl Backplane {
    pub fn new(
        config: &FlightConfig,
        clock: Arc<dyn Clock>,
        sensors: Box<dyn Sensors>,
        companion_enable: Box<dyn OutputPin>,
    ) -> Arc<Self> {
        let capacity = config.queues.capacity;
        Arc::new(Self {
            inbound: ChannelQueue::new("inbound", capacity),
            radio: ChannelQueue::new("radio", capacity),
            pdu: ChannelQueue::new("pdu", capacity),
            companion: ChannelQueue::new("companion", capacity),
            scheduler: Scheduler::new(Arc::clone(&clock), config.scheduler.slice),
            clock,
            sensors: BusLock::new(SENSOR_BUS, sensors),
            companion_power: PowerLine::new("companion_enable", companion_enable),
            switches: Arc::new(SwitchCache::new()),
            deployment_mode: AtomicBool::new(false),
        })
    }

    /// The queue a channel consumes, if it has one.
    pub fn queue_for(&self, channel: ChannelId) -> Option<&ChannelQueue> {
        match channel {
            ChannelId::RADIO => Some(&self.radio),
            ChannelId::PDU => Some(&self.pdu),
            ChannelId::COMPANION => Some(&self.companion),
            _ => None,
        }
    }

    pub fn queues(&self) -> [&ChannelQueue; 4] {
        [&self.inbound, &self.radio, &self.pdu, &self.companion]
    }

    pub fn deployment_mode(&self) -> bool {
        self.deployment_mode.load(Ordering::SeqCst)
    }

    pub fn set_deployment_mode(&self, active: bool) {
        self.deployment_mode.store(active, Ordering::SeqCst);
    }

    /// Battery voltage via the sensor bus; `None` if unreadable.
    pub fn battery_voltage(&self) -> Option<f32> {
        self.read_sensor(|sensors| sensors.battery_voltage())
    }

    /// Battery temperature via the sensor bus; `None` if unreadable.
    pub fn battery_temperature_c(&self) -> Option<f32> {
        self.read_sensor(|sensors| sensors.battery_temperature_c())
    }

    fn read_sensor(&self, read: impl FnOnce(&mut Box<dyn Sensors>) -> Option<f32>) -> Option<f32> {
        match self.sensors.transaction(read) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "sensor bus unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use flightcore_hal::sim::SimPin;
    use flightcore_hal::ManualClock;

    use super::*;
    use crate::sensors::SimSensors;

    fn backplane(sensors: SimSensors, pin: SimPin) -> Arc<Backplane> {
        Backplane::new(
            &FlightConfig::default(),
            Arc::new(ManualClock::new()),
            Box::new(sensors),
            Box::new(pin),
        )
    }

    #[test]
    fn queue_lookup_by_channel() {
        let bp = backplane(SimSensors::default(), SimPin::default());
        assert_eq!(bp.queue_for(ChannelId::RADIO).unwrap().name(), "radio");
        assert_eq!(bp.queue_for(ChannelId::PDU).unwrap().name(), "pdu");
        assert_eq!(bp.queue_for(ChannelId::COMPANION).unwrap().name(), "companion");
        assert!(bp.queue_for(ChannelId::NONE).is_none());
        assert!(bp.queues().iter().all(|q| q.capacity() == 50));
    }

    #[test]
    fn power_line_reads_back_pin_level() {
        let pin = SimPin::new(false);
        let bp = backplane(SimSensors::default(), pin.clone());
        assert!(!bp.companion_power.is_enabled());
        assert!(bp.companion_power.enable());
        assert!(pin.is_set_high());
        bp.companion_power.disable();
        assert!(!bp.companion_power.is_enabled());
    }

    #[test]
    fn sensor_reads_go_through_the_bus() {
        let sensors = SimSensors::new(7.4, -3.0);
        let bp = backplane(sensors.clone(), SimPin::default());
        assert_eq!(bp.battery_voltage(), Some(7.4));
        sensors.set_temperature(None);
        assert_eq!(bp.battery_temperature_c(), None);
    }

    #[test]
    fn sensor_read_while_holding_another_bus_is_refused() {
        let bp = backplane(SimSensors::new(7.4, 20.0), SimPin::default());
        let spi = BusLock::new("spi1", ());
        let inside = spi.transaction(|_| bp.battery_voltage()).unwrap();
        assert_eq!(inside, None);
    }
}
