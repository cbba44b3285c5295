//! Inbound packet dispatch.
//!
//! The router drains the shared inbound queue one packet per pass and
//! decides, by destination node, which channel queue the packet belongs
//! to. Commands addressed to the onboard computer are decoded into a
//! [`Command`] here and handled locally or forwarded to the PDU.

use std::sync::Arc;
use std::time::Duration;

use flightcore_hal::Clock;
use flightcore_packet::{
    ChannelId, Command, NodeId, Packet, PacketType, Switch, SwitchState,
};

use crate::backplane::Backplane;
use crate::companion::CompanionLauncher;
use crate::config::RouterConfig;
use crate::scheduler::CancelToken;

/// Where a dispatched packet ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Pushed onto a channel queue.
    Queued(ChannelId),
    /// Consumed by the router itself.
    Handled,
    /// Discarded, with the reason.
    Dropped(&'static str),
}

pub struct Router {
    backplane: Arc<Backplane>,
    config: RouterConfig,
    companion: CompanionLauncher,
    next_deployment_beacon: Duration,
}

impl Router {
    pub fn new(backplane: Arc<Backplane>, config: RouterConfig, companion: CompanionLauncher) -> Self {
        let next_deployment_beacon = backplane.clock.now() + config.deployment_beacon_interval;
        Self {
            backplane,
            config,
            companion,
            next_deployment_beacon,
        }
    }

    pub fn backplane(&self) -> &Arc<Backplane> {
        &self.backplane
    }

    /// Route one packet from the inbound queue, if there is one.
    pub fn route_once(&mut self) -> Option<Routed> {
        let packet = self.backplane.inbound.pop()?;
        Some(self.dispatch(packet))
    }

    pub fn dispatch(&mut self, packet: Packet) -> Routed {
        tracing::debug!(packet = %packet, "routing");
        let routed = match packet.destination {
            NodeId::Ground => self.to_ground(packet),
            NodeId::Companion => self.to_companion(packet),
            NodeId::Obc => self.handle_local(packet),
        };
        if let Routed::Dropped(reason) = routed {
            tracing::warn!(reason, "packet dropped");
        }
        routed
    }

    fn to_ground(&self, packet: Packet) -> Routed {
        match packet.channel_out {
            ChannelId::RADIO => {
                self.backplane.radio.push(packet);
                Routed::Queued(ChannelId::RADIO)
            }
            _ => Routed::Dropped("no ground egress on requested channel"),
        }
    }

    fn to_companion(&mut self, packet: Packet) -> Routed {
        let powered = self.backplane.companion_power.is_enabled() || self.power_on_companion(false);
        if powered {
            self.ensure_companion_channel();
        } else {
            self.request_switch_refresh();
        }
        self.backplane.companion.push(packet);
        Routed::Queued(ChannelId::COMPANION)
    }

    fn handle_local(&mut self, packet: Packet) -> Routed {
        let command = match Command::decode(&packet) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, "undecodable command");
                return Routed::Dropped("malformed command");
            }
        };

        match command {
            Command::ObcPing => {
                let pong = packet
                    .reply(PacketType::DATA_OBC_PONG)
                    .with_payload(&b"Pong"[..]);
                self.dispatch(pong)
            }
            Command::EpsCommunicate => self.to_pdu(packet),
            Command::EpsSwitchName {
                switch: Switch::Companion,
                state: SwitchState::On,
                force,
            } => {
                if self.power_on_companion(force) {
                    self.ensure_companion_channel();
                } else {
                    self.request_switch_refresh();
                }
                Routed::Handled
            }
            Command::EpsSwitchName {
                switch: Switch::Companion,
                state: SwitchState::Off,
                ..
            } => {
                if self.backplane.scheduler.is_running(ChannelId::COMPANION) {
                    self.backplane.companion.push(packet);
                    Routed::Queued(ChannelId::COMPANION)
                } else {
                    self.backplane.companion_power.disable();
                    tracing::info!("companion powered off");
                    Routed::Handled
                }
            }
            Command::EpsSwitchName { .. } => self.to_pdu(packet),
            Command::EpsSwitchStatus {
                switch: Switch::Companion,
            } => {
                let enabled = u8::from(self.backplane.companion_power.is_enabled());
                let response = packet
                    .reply(PacketType::DATA_EPS_RESPONSE)
                    .with_payload(vec![Switch::Companion.id(), enabled]);
                self.dispatch(response)
            }
            Command::EpsSwitchStatus { .. } => self.to_pdu(packet),
            Command::ObcSendBeacon => {
                self.send_beacons();
                Routed::Handled
            }
            Command::ObcHalt | Command::CameraCapture | Command::Unsupported(_) => {
                Routed::Dropped("unsupported command for onboard computer")
            }
        }
    }

    fn to_pdu(&self, packet: Packet) -> Routed {
        self.backplane.pdu.push(packet);
        Routed::Queued(ChannelId::PDU)
    }

    /// Assert the companion enable line if the battery allows it.
    fn power_on_companion(&self, force: bool) -> bool {
        let voltage = self.backplane.battery_voltage();
        let healthy = voltage.is_some_and(|v| v >= self.config.companion_min_voltage);
        if !healthy && !force {
            tracing::info!(?voltage, "battery too low to power companion");
            return false;
        }
        let asserted = self.backplane.companion_power.enable();
        if asserted {
            tracing::info!(?voltage, force, "companion powered on");
        } else {
            tracing::warn!("companion enable line did not assert");
        }
        asserted
    }

    fn ensure_companion_channel(&self) {
        match self.companion.ensure_running(&self.backplane) {
            Ok(true) => tracing::info!("companion channel started"),
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "failed to start companion channel"),
        }
    }

    /// Ask the PDU channel to refresh and downlink every switch state.
    pub fn request_switch_refresh(&self) {
        let request = Command::EpsSwitchStatus { switch: Switch::All }
            .to_packet(NodeId::Ground, NodeId::Obc);
        self.backplane.pdu.push(request);
    }

    /// Collect every sensor beacon for the downlink, then request a switch
    /// refresh.
    pub fn send_beacons(&self) -> usize {
        let deci = self.backplane.clock.uptime_deci();
        let beacons = self
            .backplane
            .sensors
            .transaction(|sensors| sensors.beacons(deci))
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "sensor bus unavailable, no beacons");
                Vec::new()
            });
        let count = beacons.len();
        for beacon in beacons {
            let packet = Packet::new(PacketType::DATA_OBC_BEACON, NodeId::Obc, NodeId::Ground)
                .with_channels(ChannelId::NONE, ChannelId::RADIO)
                .with_payload(beacon.to_bytes());
            self.backplane.radio.push(packet);
        }
        self.request_switch_refresh();
        tracing::debug!(count, "beacons queued");
        count
    }

    /// Beacon on the deployment interval while deployment mode is active.
    ///
    /// Returns whether beacons were sent.
    pub fn beacon_if_deployed(&mut self) -> bool {
        if !self.backplane.deployment_mode() {
            return false;
        }
        let now = self.backplane.clock.now();
        if now < self.next_deployment_beacon {
            return false;
        }
        tracing::info!("deployment beacons");
        self.send_beacons();
        self.next_deployment_beacon = now + self.config.deployment_beacon_interval;
        true
    }

    /// One router pass.
    pub fn tick(&mut self) -> Option<Routed> {
        self.beacon_if_deployed();
        self.route_once()
    }

    /// Run passes until `token` is cancelled.
    pub fn run(&mut self, token: &CancelToken) {
        tracing::info!("router running");
        while !token.is_cancelled() {
            self.tick();
            self.backplane.clock.sleep(self.config.loop_period);
        }
        tracing::info!("router stopped");
    }
}

#[cfg(test)]
mod tests {
    use flightcore_hal::sim::{SimPin, SimSerial};
    use flightcore_hal::{ManualClock, OutputPin};
    use flightcore_packet::{Beacon, Reading};

    use super::*;
    use crate::config::{CompanionConfig, FlightConfig};
    use crate::sensors::SimSensors;

    struct Rig {
        clock: ManualClock,
        sensors: SimSensors,
        power: SimPin,
        router: Router,
    }

    impl Rig {
        fn backplane(&self) -> &Arc<Backplane> {
            self.router.backplane()
        }
    }

    impl Drop for Rig {
        fn drop(&mut self) {
            self.backplane().scheduler.shutdown();
        }
    }

    fn rig(voltage: f32) -> Rig {
        let clock = ManualClock::new();
        let sensors = SimSensors::new(voltage, 20.0);
        let power = SimPin::new(false);
        let backplane = Backplane::new(
            &FlightConfig::default(),
            Arc::new(clock.clone()),
            Box::new(sensors.clone()),
            Box::new(power.clone()),
        );
        let link = SimSerial::new();
        let launcher = CompanionLauncher::new(
            Arc::new(move || Box::new(link.clone()) as Box<dyn flightcore_hal::SerialPort>),
            CompanionConfig::default(),
            9000,
        );
        Rig {
            clock,
            sensors,
            power,
            router: Router::new(backplane, RouterConfig::default(), launcher),
        }
    }

    fn uplink(command: Command) -> Packet {
        command
            .to_packet(NodeId::Ground, NodeId::Obc)
            .with_channels(ChannelId::RADIO, ChannelId::NONE)
    }

    fn companion_switch(state: SwitchState, force: bool) -> Packet {
        uplink(Command::EpsSwitchName {
            switch: Switch::Companion,
            state,
            force,
        })
    }

    #[test]
    fn ground_packets_go_to_radio_only() {
        let mut rig = rig(7.4);
        let beacon = Packet::new(PacketType::DATA_OBC_BEACON, NodeId::Obc, NodeId::Ground);
        assert_eq!(
            rig.router
                .dispatch(beacon.clone().with_channels(ChannelId::NONE, ChannelId::RADIO)),
            Routed::Queued(ChannelId::RADIO)
        );
        assert!(matches!(
            rig.router
                .dispatch(beacon.with_channels(ChannelId::NONE, ChannelId::PDU)),
            Routed::Dropped(_)
        ));
        assert_eq!(rig.backplane().radio.len(), 1);
    }

    #[test]
    fn ping_is_answered_with_pong_toward_ground() {
        let mut rig = rig(7.4);
        rig.backplane().inbound.push(uplink(Command::ObcPing));

        assert_eq!(rig.router.route_once(), Some(Routed::Queued(ChannelId::RADIO)));
        let pong = rig.backplane().radio.pop().unwrap();
        assert_eq!(pong.packet_type, PacketType::DATA_OBC_PONG);
        assert_eq!(pong.origin, NodeId::Obc);
        assert_eq!(pong.destination, NodeId::Ground);
        assert_eq!(&pong.payload[..], b"Pong");
        assert_eq!(rig.router.route_once(), None);
    }

    #[test]
    fn pdu_commands_are_forwarded() {
        let mut rig = rig(7.4);
        for command in [
            Command::EpsCommunicate,
            Command::EpsSwitchName {
                switch: Switch::HEATER,
                state: SwitchState::On,
                force: false,
            },
            Command::EpsSwitchStatus { switch: Switch::All },
        ] {
            assert_eq!(
                rig.router.dispatch(uplink(command)),
                Routed::Queued(ChannelId::PDU)
            );
        }
        assert_eq!(rig.backplane().pdu.len(), 3);
    }

    #[test]
    fn low_battery_blocks_companion_power_and_requests_refresh() {
        let mut rig = rig(6.2);
        let capture = Packet::new(PacketType::COMMAND_CAMERA_CAPTURE, NodeId::Ground, NodeId::Companion);

        assert_eq!(rig.router.dispatch(capture), Routed::Queued(ChannelId::COMPANION));
        assert!(!rig.power.is_set_high());
        assert!(!rig.backplane().scheduler.is_running(ChannelId::COMPANION));
        let refresh = rig.backplane().pdu.pop().unwrap();
        assert_eq!(
            Command::decode(&refresh).unwrap(),
            Command::EpsSwitchStatus { switch: Switch::All }
        );
    }

    #[test]
    fn healthy_battery_powers_companion_and_starts_channel() {
        let mut rig = rig(7.4);
        let capture = Packet::new(PacketType::COMMAND_CAMERA_CAPTURE, NodeId::Ground, NodeId::Companion);

        rig.router.dispatch(capture);
        assert!(rig.power.is_set_high());
        assert!(rig.backplane().scheduler.is_running(ChannelId::COMPANION));
        assert!(rig.backplane().pdu.is_empty());
    }

    #[test]
    fn forced_power_on_ignores_battery() {
        let mut rig = rig(5.0);
        assert_eq!(
            rig.router.dispatch(companion_switch(SwitchState::On, false)),
            Routed::Handled
        );
        assert!(!rig.power.is_set_high());

        rig.router.dispatch(companion_switch(SwitchState::On, true));
        assert!(rig.power.is_set_high());
        assert!(rig.backplane().scheduler.is_running(ChannelId::COMPANION));
    }

    #[test]
    fn power_off_without_channel_disables_line_directly() {
        let mut rig = rig(7.4);
        rig.power.set_high();
        assert_eq!(
            rig.router.dispatch(companion_switch(SwitchState::Off, false)),
            Routed::Handled
        );
        assert!(!rig.power.is_set_high());
    }

    #[test]
    fn power_off_with_running_channel_goes_through_its_queue() {
        let mut rig = rig(7.4);
        rig.router.dispatch(companion_switch(SwitchState::On, false));
        assert_eq!(
            rig.router.dispatch(companion_switch(SwitchState::Off, false)),
            Routed::Queued(ChannelId::COMPANION)
        );
    }

    #[test]
    fn companion_status_is_answered_locally() {
        let mut rig = rig(7.4);
        rig.power.set_high();
        let query = uplink(Command::EpsSwitchStatus {
            switch: Switch::Companion,
        });

        assert_eq!(rig.router.dispatch(query), Routed::Queued(ChannelId::RADIO));
        let response = rig.backplane().radio.pop().unwrap();
        assert_eq!(response.packet_type, PacketType::DATA_EPS_RESPONSE);
        assert_eq!(&response.payload[..], &[16, 1]);
        assert!(rig.backplane().pdu.is_empty());
    }

    #[test]
    fn send_beacon_downlinks_sensors_and_refreshes_switches() {
        let mut rig = rig(7.4);
        rig.sensors.set_beacons(vec![Beacon::new(
            0,
            Reading::Magnetometer {
                field: [1.0, 2.0, 3.0],
            },
        )]);
        rig.clock.advance(Duration::from_millis(1500));

        assert_eq!(rig.router.dispatch(uplink(Command::ObcSendBeacon)), Routed::Handled);
        let packet = rig.backplane().radio.pop().unwrap();
        assert_eq!(packet.packet_type, PacketType::DATA_OBC_BEACON);
        assert_eq!(Beacon::decode(&packet.payload).unwrap().deci, 15);
        assert_eq!(rig.backplane().pdu.len(), 1);
    }

    #[test]
    fn unsupported_and_malformed_commands_are_dropped() {
        let mut rig = rig(7.4);
        assert!(matches!(
            rig.router.dispatch(uplink(Command::CameraCapture)),
            Routed::Dropped(_)
        ));
        let truncated = Packet::new(PacketType::COMMAND_EPS_SWITCH_NAME, NodeId::Ground, NodeId::Obc)
            .with_payload(vec![5]);
        assert_eq!(rig.router.dispatch(truncated), Routed::Dropped("malformed command"));
        assert!(rig.backplane().pdu.is_empty());
        assert!(rig.backplane().radio.is_empty());
    }

    #[test]
    fn deployment_beacons_follow_interval_only_in_deployment_mode() {
        let mut rig = rig(7.4);
        rig.clock.advance(Duration::from_secs(20));
        assert!(!rig.router.beacon_if_deployed());

        rig.backplane().set_deployment_mode(true);
        assert!(rig.router.beacon_if_deployed());
        assert!(!rig.router.beacon_if_deployed());
        rig.clock.advance(Duration::from_secs(20));
        assert!(rig.router.beacon_if_deployed());
        assert_eq!(rig.sensors.beacon_reads(), 2);
    }
}
