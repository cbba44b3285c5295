use std::sync::Arc;
use std::time::Duration;

use flightcore_hal::RadioDevice;
use flightcore_packet::{ChannelId, Packet, PacketType};

use crate::backplane::Backplane;
use crate::error::RadioError;
use crate::radio::transport::RadioTransport;
use crate::scheduler::{Channel, ChannelContext};

/// Packet types allowed on the downlink.
pub const DOWNLINK_TYPES: [PacketType; 6] = [
    PacketType::DATA_OBC_BEACON,
    PacketType::DATA_OBC_PONG,
    PacketType::DATA_EPS_RESPONSE,
    PacketType::DATA_RADIO_RESPONSE,
    PacketType::DATA_ADCS_RESPONSE,
    PacketType::DATA_OBC_RESPONSE,
];

pub fn is_downlink(packet_type: PacketType) -> bool {
    DOWNLINK_TYPES.contains(&packet_type)
}

/// The ground link.
///
/// Each pass transmits at most one queued packet, then listens for an
/// uplink for a window that shrinks as the radio queue backs up.
pub struct RadioChannel<R> {
    transport: RadioTransport<R>,
    backplane: Arc<Backplane>,
    stack_budget: usize,
}

impl<R: RadioDevice + 'static> RadioChannel<R> {
    pub fn new(transport: RadioTransport<R>, backplane: Arc<Backplane>, stack_budget: usize) -> Self {
        Self {
            transport,
            backplane,
            stack_budget,
        }
    }

    /// Transmit the oldest queued packet if it is a downlink type.
    ///
    /// Returns whether something went on air.
    pub fn transmit_next(&mut self, ctx: &ChannelContext) -> bool {
        let Some(packet) = self.backplane.radio.pop() else {
            return false;
        };
        if !is_downlink(packet.packet_type) {
            tracing::warn!(packet = %packet, "dropping non-downlink packet");
            return false;
        }
        if self.transport.send(&packet).is_err() {
            return false;
        }
        ctx.sleep(self.transport.config().post_send_delay);
        true
    }

    /// Listen once and hand any uplink to the router.
    pub fn receive(&mut self) -> Option<Packet> {
        let timeout = self.transport.receive_timeout(self.backplane.radio.len());
        match self.transport.recv(timeout) {
            Ok(Some(mut packet)) => {
                packet.channel_in = ChannelId::RADIO;
                self.backplane.inbound.push(packet.clone());
                Some(packet)
            }
            Ok(None) => None,
            Err(RadioError::Decode(err)) => {
                tracing::warn!(error = %err, "discarding undecodable uplink");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "radio receive failed");
                None
            }
        }
    }
}

impl<R: RadioDevice + 'static> Channel for RadioChannel<R> {
    fn id(&self) -> ChannelId {
        ChannelId::RADIO
    }

    fn name(&self) -> &'static str {
        "radio"
    }

    fn stack_budget(&self) -> usize {
        self.stack_budget
    }

    fn setup(&mut self, ctx: &ChannelContext) {
        while let Err(err) = self.transport.init() {
            tracing::warn!(error = %err, "radio init failed, retrying");
            if !ctx.sleep(self.transport.config().init_retry_interval) {
                return;
            }
        }
    }

    fn run_once(&mut self, ctx: &ChannelContext) {
        self.transmit_next(ctx);
        if !ctx.is_cancelled() {
            self.receive();
        }
    }

    fn period(&self) -> Duration {
        self.transport.config().loop_period
    }
}
