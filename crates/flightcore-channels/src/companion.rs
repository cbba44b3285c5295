//! Serial link to the companion single-board computer.
//!
//! The channel exists only while the companion is powered. The router
//! starts it after asserting the enable line; the channel tears itself
//! down after an orderly halt handshake.

use std::sync::Arc;
use std::time::Duration;

use flightcore_hal::SerialPort;
use flightcore_packet::{
    ChannelId, Command, NodeId, Packet, PacketError, PacketType, SlipStream, Switch, SwitchState,
};

use crate::backplane::Backplane;
use crate::config::CompanionConfig;
use crate::error::SchedulerError;
use crate::scheduler::{Channel, ChannelContext};

/// Opens the companion serial port each time the channel is started.
pub type LinkFactory = Arc<dyn Fn() -> Box<dyn SerialPort> + Send + Sync>;

/// Starts the companion channel on demand.
#[derive(Clone)]
pub struct CompanionLauncher {
    link: LinkFactory,
    config: CompanionConfig,
    stack_budget: usize,
}

impl CompanionLauncher {
    pub fn new(link: LinkFactory, config: CompanionConfig, stack_budget: usize) -> Self {
        Self {
            link,
            config,
            stack_budget,
        }
    }

    /// Start the channel unless one is registered already.
    ///
    /// Returns whether a new channel was started.
    pub fn ensure_running(&self, backplane: &Arc<Backplane>) -> Result<bool, SchedulerError> {
        if backplane.scheduler.is_running(ChannelId::COMPANION) {
            return Ok(false);
        }
        let channel = CompanionChannel::new(
            (self.link)(),
            Arc::clone(backplane),
            self.config.clone(),
            self.stack_budget,
        );
        match backplane.scheduler.spawn(channel) {
            Ok(()) => Ok(true),
            Err(SchedulerError::AlreadyRunning(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

pub struct CompanionChannel<S> {
    stream: SlipStream<S>,
    backplane: Arc<Backplane>,
    config: CompanionConfig,
    stack_budget: usize,
}

impl<S: SerialPort + 'static> CompanionChannel<S> {
    pub fn new(
        serial: S,
        backplane: Arc<Backplane>,
        config: CompanionConfig,
        stack_budget: usize,
    ) -> Self {
        Self {
            stream: SlipStream::with_max_frame(serial, config.max_frame),
            backplane,
            config,
            stack_budget,
        }
    }

    /// Decode whatever the companion has sent and queue it for routing.
    ///
    /// Returns the number of packets queued.
    pub fn receive_from_stream(&mut self) -> usize {
        let batch = match self.stream.read_batch() {
            Ok(batch) => batch,
            Err(PacketError::ConnectionClosed) => {
                tracing::debug!("companion link closed");
                return 0;
            }
            Err(err) => {
                tracing::warn!(error = %err, "companion link read failed");
                return 0;
            }
        };
        if !batch.rejected.is_empty() || batch.discarded > 0 {
            tracing::debug!(
                rejected = batch.rejected.len(),
                discarded = batch.discarded,
                "companion frames lost"
            );
        }
        let count = batch.packets.len();
        for mut packet in batch.packets {
            packet.channel_in = ChannelId::COMPANION;
            tracing::debug!(packet = %packet, "companion uplink");
            self.backplane.inbound.push(packet);
        }
        count
    }

    /// Frame and write one packet to the companion.
    pub fn send_to_stream(&mut self, packet: &Packet) -> Result<(), PacketError> {
        self.stream.send(packet).inspect_err(|err| {
            tracing::warn!(error = %err, packet = %packet, "companion link write failed");
        })
    }

    pub fn handle_packet(&mut self, ctx: &ChannelContext, packet: Packet) {
        let power_off = matches!(
            Command::decode(&packet),
            Ok(Command::EpsSwitchName {
                switch: Switch::Companion,
                state: SwitchState::Off,
                ..
            })
        );
        if power_off {
            self.shutdown(ctx);
        } else {
            let _ = self.send_to_stream(&packet);
        }
    }

    /// Ask the companion to halt, give it time, then cut its power and
    /// remove this channel.
    pub fn shutdown(&mut self, ctx: &ChannelContext) {
        tracing::info!(grace = ?self.config.shutdown_grace, "halting companion");
        let halt = Packet::new(PacketType::COMMAND_OBC_HALT, NodeId::Obc, NodeId::Companion)
            .with_channels(ChannelId::COMPANION, ChannelId::COMPANION);
        let _ = self.send_to_stream(&halt);

        ctx.sleep(self.config.shutdown_grace);
        self.backplane.companion_power.disable();
        let dropped = self.backplane.companion.clear();
        tracing::info!(dropped, "companion powered off");

        if let Err(err) = self.backplane.scheduler.kill(ctx.id()) {
            tracing::debug!(error = %err, "companion channel not registered");
        }
    }
}

impl<S: SerialPort + 'static> Channel for CompanionChannel<S> {
    fn id(&self) -> ChannelId {
        ChannelId::COMPANION
    }

    fn name(&self) -> &'static str {
        "companion"
    }

    fn stack_budget(&self) -> usize {
        self.stack_budget
    }

    fn setup(&mut self, ctx: &ChannelContext) {
        ctx.sleep(self.config.boot_delay);
    }

    fn run_once(&mut self, ctx: &ChannelContext) {
        if let Some(packet) = self.backplane.companion.pop() {
            self.handle_packet(ctx, packet);
        }
        if !ctx.is_cancelled() {
            self.receive_from_stream();
        }
    }

    fn period(&self) -> Duration {
        self.config.loop_period
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use flightcore_hal::sim::{SimPin, SimSerial};
    use flightcore_hal::{Clock, ManualClock, OutputPin};
    use flightcore_packet::{deframe, frame, DEFAULT_MAX_FRAME};

    use super::*;
    use crate::config::FlightConfig;
    use crate::sensors::SimSensors;

    struct Rig {
        clock: ManualClock,
        serial: SimSerial,
        power: SimPin,
        backplane: Arc<Backplane>,
        channel: CompanionChannel<SimSerial>,
        ctx: ChannelContext,
    }

    fn rig() -> Rig {
        let clock = ManualClock::new();
        let serial = SimSerial::new();
        let power = SimPin::new(true);
        let backplane = Backplane::new(
            &FlightConfig::default(),
            Arc::new(clock.clone()),
            Box::new(SimSensors::default()),
            Box::new(power.clone()),
        );
        let channel = CompanionChannel::new(
            serial.clone(),
            Arc::clone(&backplane),
            CompanionConfig::default(),
            9000,
        );
        let ctx = ChannelContext::detached(
            ChannelId::COMPANION,
            "companion",
            Arc::new(clock.clone()),
            Duration::from_millis(10),
        );
        Rig {
            clock,
            serial,
            power,
            backplane,
            channel,
            ctx,
        }
    }

    fn framed(packet: &Packet) -> BytesMut {
        let mut buf = BytesMut::new();
        frame(packet, DEFAULT_MAX_FRAME, &mut buf).unwrap();
        buf
    }

    fn capture() -> Packet {
        Packet::new(PacketType::COMMAND_CAMERA_CAPTURE, NodeId::Ground, NodeId::Companion)
    }

    #[test]
    fn received_frames_are_stamped_and_routed() {
        let mut rig = rig();
        let response = Packet::new(PacketType::DATA_OBC_RESPONSE, NodeId::Companion, NodeId::Ground)
            .with_channels(ChannelId::NONE, ChannelId::RADIO)
            .with_payload(&b"image"[..]);
        rig.serial.inject_rx(b"noise");
        rig.serial.inject_rx(&framed(&response));

        assert_eq!(rig.channel.receive_from_stream(), 1);
        let routed = rig.backplane.inbound.pop().unwrap();
        assert_eq!(routed.channel_in, ChannelId::COMPANION);
        assert_eq!(routed.payload, response.payload);
    }

    #[test]
    fn garbage_alone_produces_nothing() {
        let mut rig = rig();
        rig.serial.inject_rx(&[0x01, 0x02, 0xDB, 0x7F]);
        assert_eq!(rig.channel.receive_from_stream(), 0);
        assert!(rig.backplane.inbound.is_empty());
    }

    #[test]
    fn queued_packets_are_framed_onto_the_link() {
        let mut rig = rig();
        rig.backplane.companion.push(capture());
        rig.channel.run_once(&rig.ctx);

        let mut written = BytesMut::from(&rig.serial.take_tx()[..]);
        assert_eq!(deframe(&mut written, DEFAULT_MAX_FRAME).unwrap(), Some(capture()));
    }

    #[test]
    fn short_write_is_a_link_failure() {
        let mut rig = rig();
        rig.serial.limit_writes(3);
        assert!(matches!(
            rig.channel.send_to_stream(&capture()),
            Err(PacketError::ShortWrite { written: 3, .. })
        ));
    }

    #[test]
    fn power_off_command_runs_halt_handshake() {
        let mut rig = rig();
        let off = Command::EpsSwitchName {
            switch: Switch::Companion,
            state: SwitchState::Off,
            force: false,
        }
        .to_packet(NodeId::Ground, NodeId::Obc);
        rig.backplane.companion.push(off);
        rig.backplane.companion.push(capture());

        rig.channel.run_once(&rig.ctx);

        let mut written = BytesMut::from(&rig.serial.take_tx()[..]);
        let halt = deframe(&mut written, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(halt.packet_type, PacketType::COMMAND_OBC_HALT);
        assert_eq!(rig.clock.now(), Duration::from_secs(20));
        assert!(!rig.power.is_set_high());
        assert!(rig.backplane.companion.is_empty());
    }
}
