use std::sync::Arc;
use std::time::Duration;

use flightcore_hal::{Clock, SerialPort};
use flightcore_packet::beacon::SWITCH_BEACON_ENTRIES;
use flightcore_packet::{
    Beacon, ChannelId, Command, NodeId, Packet, PacketType, Reading, SwitchState,
};

use crate::backplane::Backplane;
use crate::config::PduConfig;
use crate::deployment::{DeploymentState, DeploymentStore};
use crate::pdu::engine::PduEngine;
use crate::scheduler::{Channel, ChannelContext};

/// Switch beacon entry for a state the PDU has not confirmed yet.
pub const STATE_UNKNOWN: u8 = 0xFF;

/// The power-distribution channel.
///
/// Setup warms the PDU up, waits for it to answer a ping and runs the
/// one-shot deployment sequence if the store says it has not happened.
/// Each pass then services one queued command and regulates the heater.
pub struct PduChannel<S> {
    engine: PduEngine<S>,
    backplane: Arc<Backplane>,
    store: Box<dyn DeploymentStore>,
    stack_budget: usize,
    state: DeploymentState,
    window_end: Duration,
    next_heater_check: Duration,
}

impl<S: SerialPort + 'static> PduChannel<S> {
    pub fn new(
        serial: S,
        backplane: Arc<Backplane>,
        store: Box<dyn DeploymentStore>,
        config: PduConfig,
        stack_budget: usize,
    ) -> Self {
        let engine = PduEngine::new(
            serial,
            Arc::clone(&backplane.clock),
            config,
            Arc::clone(&backplane.switches),
        );
        Self {
            engine,
            backplane,
            store,
            stack_budget,
            state: DeploymentState::NotDeployed,
            window_end: Duration::ZERO,
            next_heater_check: Duration::ZERO,
        }
    }

    pub fn deployment_state(&self) -> DeploymentState {
        self.state
    }

    pub fn engine(&self) -> &PduEngine<S> {
        &self.engine
    }

    fn config(&self) -> &PduConfig {
        self.engine.config()
    }

    /// Wait out the warm-up, then ping until the PDU answers.
    ///
    /// Returns `false` if the channel was cancelled first.
    fn wait_for_pdu(&mut self, ctx: &ChannelContext) -> bool {
        if !ctx.sleep(self.config().warmup) {
            return false;
        }
        loop {
            match self.engine.ping() {
                Ok(()) => {
                    tracing::info!("PDU answered");
                    return true;
                }
                Err(err) => tracing::warn!(error = %err, "PDU not ready"),
            }
            if !ctx.sleep(self.config().retry_interval) {
                return false;
            }
        }
    }

    /// Fire the burn wire unless the store records a past deployment.
    ///
    /// Unconfirmed burn-wire transitions are logged and the sequence goes on.
    /// A hold cut short by cancellation switches the wire off but leaves the
    /// marker unwritten, so the next boot fires again.
    pub fn run_deployment(&mut self, ctx: &ChannelContext) {
        let deployed = self.store.is_deployed().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "cannot read deployment marker, assuming first boot");
            false
        });
        if deployed {
            tracing::info!("already deployed, skipping burn wire");
            self.state = DeploymentState::Deployed;
            return;
        }

        if !ctx.sleep(self.config().deployment_delay) {
            return;
        }
        tracing::info!("firing burn wire");
        if let Err(err) = self.engine.set_burn_wire(SwitchState::On) {
            tracing::warn!(error = %err, "burn wire on not confirmed, continuing");
        }
        let held = ctx.sleep(self.config().burn_wire_on);
        if let Err(err) = self.engine.set_burn_wire(SwitchState::Off) {
            tracing::warn!(error = %err, "burn wire off not confirmed, continuing");
        }
        if !held {
            tracing::warn!("burn wire hold interrupted, deployment not recorded");
            return;
        }
        if let Err(err) = self.store.mark_deployed() {
            tracing::warn!(error = %err, "failed to persist deployment marker");
        }

        self.state = DeploymentState::Deploying;
        self.window_end = ctx.clock().now() + self.config().deployment_window;
        self.backplane.set_deployment_mode(true);
        tracing::info!(window = ?self.config().deployment_window, "deployment window open");
    }

    /// Service one command packet taken from the PDU queue.
    pub fn handle_packet(&mut self, packet: Packet) {
        let command = match Command::decode(&packet) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, packet = %packet, "dropping malformed PDU command");
                return;
            }
        };
        match command {
            Command::EpsCommunicate => match self.engine.ping_with_retry() {
                Ok(()) => {
                    let reply = packet
                        .reply(PacketType::DATA_EPS_RESPONSE)
                        .with_payload(&b"Pong"[..]);
                    self.backplane.inbound.push(reply);
                }
                Err(err) => tracing::warn!(error = %err, "PDU communicate failed"),
            },
            Command::EpsSwitchName { switch, state, .. } => {
                if let Err(err) = self.engine.set_switch(switch, state) {
                    tracing::warn!(error = %err, %switch, %state, "switch command failed");
                }
            }
            Command::EpsSwitchStatus { .. } => {
                if let Err(err) = self.engine.refresh_switch_states() {
                    tracing::warn!(error = %err, "switch refresh failed");
                }
                self.send_switch_beacon(self.backplane.clock.uptime_deci());
            }
            other => {
                tracing::debug!(packet_type = %other.packet_type(), "PDU channel ignoring command");
            }
        }
    }

    /// Downlink the cached switch states plus the companion enable line.
    fn send_switch_beacon(&self, deci: u32) {
        let mut states = [STATE_UNKNOWN; SWITCH_BEACON_ENTRIES];
        for (slot, state) in states.iter_mut().zip(self.backplane.switches.telemetry()) {
            if let Some(state) = state {
                *slot = state as u8;
            }
        }
        states[SWITCH_BEACON_ENTRIES - 1] = u8::from(self.backplane.companion_power.is_enabled());

        let beacon = Beacon::new(deci, Reading::Switch { states });
        let packet = Packet::new(PacketType::DATA_OBC_BEACON, NodeId::Obc, NodeId::Ground)
            .with_channels(ChannelId::PDU, ChannelId::RADIO)
            .with_payload(beacon.to_bytes());
        self.backplane.radio.push(packet);
    }

    /// Heater on at or below the threshold, off above it.
    pub fn regulate_heater(&mut self) {
        let Some(temperature) = self.backplane.battery_temperature_c() else {
            tracing::warn!("battery temperature unavailable, heater unchanged");
            return;
        };
        let state = SwitchState::from(temperature <= self.config().heater_threshold_c);
        tracing::debug!(temperature, %state, "heater check");
        if let Err(err) = self.engine.set_heater(state) {
            tracing::warn!(error = %err, "heater command failed");
        }
    }
}

impl<S: SerialPort + 'static> Channel for PduChannel<S> {
    fn id(&self) -> ChannelId {
        ChannelId::PDU
    }

    fn name(&self) -> &'static str {
        "pdu"
    }

    fn stack_budget(&self) -> usize {
        self.stack_budget
    }

    fn setup(&mut self, ctx: &ChannelContext) {
        if !self.wait_for_pdu(ctx) {
            return;
        }
        self.run_deployment(ctx);
        self.next_heater_check = ctx.clock().now();
    }

    fn run_once(&mut self, ctx: &ChannelContext) {
        if let Some(packet) = self.backplane.pdu.pop() {
            self.handle_packet(packet);
        }

        let now = ctx.clock().now();
        if now >= self.next_heater_check {
            self.regulate_heater();
            self.next_heater_check = now + self.config().heater_check_interval;
        }

        if self.state == DeploymentState::Deploying && now >= self.window_end {
            self.state = DeploymentState::Deployed;
            self.backplane.set_deployment_mode(false);
            tracing::info!("deployment window closed");
        }
    }

    fn period(&self) -> Duration {
        match self.state {
            DeploymentState::Deploying => self.config().deployment_loop_interval,
            _ => self.config().loop_period,
        }
    }
}
