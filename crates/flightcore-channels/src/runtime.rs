//! Boot wiring: devices in, running channels and a router out.

use std::sync::Arc;
use std::time::Duration;

use flightcore_hal::sim::{SimPin, SimRadio, SimSerial};
use flightcore_hal::{BusLock, Clock, OutputPin, RadioDevice, SerialPort};

use crate::backplane::Backplane;
use crate::companion::{CompanionLauncher, LinkFactory};
use crate::config::FlightConfig;
use crate::deployment::{DeploymentStore, MemoryStore};
use crate::error::SchedulerError;
use crate::pdu::{PduChannel, SimPdu};
use crate::radio::{RadioChannel, RadioTransport, RADIO_BUS};
use crate::router::Router;
use crate::scheduler::CancelToken;
use crate::sensors::{Sensors, SimSensors};

/// Every device the flight core drives.
pub struct Hardware<P, R> {
    pub pdu_serial: P,
    pub radio: R,
    pub radio_tx_on: Box<dyn OutputPin>,
    pub radio_rx_on: Box<dyn OutputPin>,
    pub companion_enable: Box<dyn OutputPin>,
    pub companion_link: LinkFactory,
    pub sensors: Box<dyn Sensors>,
    pub deployment: Box<dyn DeploymentStore>,
}

/// A booted flight core.
pub struct FlightCore {
    backplane: Arc<Backplane>,
    router: Router,
    shutdown_grace: Duration,
}

impl FlightCore {
    /// Build the backplane and start the radio and PDU channels.
    ///
    /// The companion channel is started later, on demand, by the router.
    pub fn boot<P, R>(
        config: &FlightConfig,
        clock: Arc<dyn Clock>,
        hardware: Hardware<P, R>,
    ) -> Result<Self, SchedulerError>
    where
        P: SerialPort + 'static,
        R: RadioDevice + 'static,
    {
        let backplane = Backplane::new(
            config,
            Arc::clone(&clock),
            hardware.sensors,
            hardware.companion_enable,
        );

        let transport = RadioTransport::new(
            Arc::new(BusLock::new(RADIO_BUS, hardware.radio)),
            hardware.radio_tx_on,
            hardware.radio_rx_on,
            clock,
            config.radio.clone(),
        );
        backplane.scheduler.spawn(RadioChannel::new(
            transport,
            Arc::clone(&backplane),
            config.scheduler.radio_stack,
        ))?;
        backplane.scheduler.spawn(PduChannel::new(
            hardware.pdu_serial,
            Arc::clone(&backplane),
            hardware.deployment,
            config.pdu.clone(),
            config.scheduler.pdu_stack,
        ))?;

        let launcher = CompanionLauncher::new(
            hardware.companion_link,
            config.companion.clone(),
            config.scheduler.companion_stack,
        );
        let router = Router::new(Arc::clone(&backplane), config.router.clone(), launcher);
        tracing::info!("flight core booted");
        Ok(Self {
            backplane,
            router,
            shutdown_grace: config.scheduler.shutdown_grace,
        })
    }

    pub fn backplane(&self) -> &Arc<Backplane> {
        &self.backplane
    }

    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Route on the calling thread until `token` is cancelled, then stop
    /// every channel. Returns what [`FlightCore::shutdown`] returns.
    pub fn run(&mut self, token: &CancelToken) -> Vec<&'static str> {
        self.router.run(token);
        self.shutdown()
    }

    /// Kill every channel and wait out the shutdown grace for them to exit.
    ///
    /// Returns the channels that were still mid-transaction at the deadline.
    pub fn shutdown(&self) -> Vec<&'static str> {
        self.backplane.scheduler.shutdown();
        self.backplane.scheduler.join(self.shutdown_grace)
    }
}

/// Simulated devices for host runs. Clones of every handle stay here so a
/// caller can script and inspect them while the channels own the originals.
#[derive(Debug, Clone)]
pub struct SimBench {
    pub pdu: SimPdu,
    pub radio: SimRadio,
    pub companion_link: SimSerial,
    pub companion_enable: SimPin,
    pub sensors: SimSensors,
    pub deployment: MemoryStore,
}

impl SimBench {
    /// A healthy satellite: battery at `voltage`, 20 C, not yet deployed.
    pub fn new(voltage: f32) -> Self {
        Self {
            pdu: SimPdu::default(),
            radio: SimRadio::new(64),
            companion_link: SimSerial::new(),
            companion_enable: SimPin::new(false),
            sensors: SimSensors::new(voltage, 20.0),
            deployment: MemoryStore::new(false),
        }
    }

    pub fn hardware(&self) -> Hardware<SimPdu, SimRadio> {
        let link = self.companion_link.clone();
        Hardware {
            pdu_serial: self.pdu.clone(),
            radio: self.radio.clone(),
            radio_tx_on: Box::new(SimPin::default()),
            radio_rx_on: Box::new(SimPin::default()),
            companion_enable: Box::new(self.companion_enable.clone()),
            companion_link: Arc::new(move || Box::new(link.clone()) as Box<dyn SerialPort>),
            sensors: Box::new(self.sensors.clone()),
            deployment: Box::new(self.deployment.clone()),
        }
    }
}
