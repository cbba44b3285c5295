use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use flightcore_hal::{BusLock, Clock, OutputPin, RadioDevice};
use flightcore_packet::{codec, Packet};

use crate::config::RadioConfig;
use crate::error::RadioError;

/// Name of the transceiver bus lock.
pub const RADIO_BUS: &str = "spi1";

/// Packet send/receive over the SPI transceiver.
///
/// Every device access is one short [`BusLock`] transaction. Receive polls
/// release the bus between attempts; the antenna switch lines are owned
/// here and need no lock.
pub struct RadioTransport<R> {
    device: Arc<BusLock<R>>,
    tx_on: Box<dyn OutputPin>,
    rx_on: Box<dyn OutputPin>,
    clock: Arc<dyn Clock>,
    config: RadioConfig,
    max_frame: usize,
}

impl<R: RadioDevice> RadioTransport<R> {
    pub fn new(
        device: Arc<BusLock<R>>,
        tx_on: Box<dyn OutputPin>,
        rx_on: Box<dyn OutputPin>,
        clock: Arc<dyn Clock>,
        config: RadioConfig,
    ) -> Self {
        let max_frame = config.max_frame;
        Self {
            device,
            tx_on,
            rx_on,
            clock,
            config,
            max_frame,
        }
    }

    /// Largest wrapped packet this transport will put on air.
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Configure the transceiver, check it can sleep and park it idle.
    pub fn init(&mut self) -> Result<(), RadioError> {
        let settings = self.config.settings();
        let device_max = self.device.try_transaction(|radio| {
            radio.init(&settings)?;
            if let Err(err) = radio.sleep() {
                tracing::warn!(error = %err, "radio refused sleep mode");
            }
            radio.set_idle()?;
            Ok::<_, RadioError>(radio.max_message_len())
        })?;
        self.max_frame = self.config.max_frame.min(device_max);
        tracing::info!(
            frequency_mhz = settings.frequency_mhz,
            tx_power_dbm = settings.tx_power_dbm,
            max_frame = self.max_frame,
            "radio initialized"
        );
        Ok(())
    }

    /// Wrap and transmit one packet, waiting for the transceiver to confirm.
    pub fn send(&mut self, packet: &Packet) -> Result<(), RadioError> {
        let mut frame = BytesMut::new();
        codec::wrap(packet, self.max_frame, &mut frame).map_err(RadioError::Encode)?;

        self.rx_on.set_low();
        self.tx_on.set_high();
        let timeout = self.config.send_timeout;
        let poll = self.config.poll_interval;
        let clock = Arc::clone(&self.clock);
        let result = self.device.try_transaction(|radio| {
            radio.send(&frame)?;
            let deadline = clock.now() + timeout;
            let confirmed = loop {
                if radio.packet_sent()? {
                    break true;
                }
                let now = clock.now();
                if now >= deadline {
                    break false;
                }
                clock.sleep(poll.min(deadline - now));
            };
            radio.sleep()?;
            radio.set_idle()?;
            if confirmed {
                Ok(())
            } else {
                Err(RadioError::SendUnconfirmed(timeout))
            }
        });
        self.tx_on.set_low();

        match &result {
            Ok(()) => tracing::debug!(len = frame.len(), packet = %packet, "radio sent"),
            Err(err) => tracing::warn!(error = %err, packet = %packet, "radio send failed"),
        }
        result
    }

    /// Listen for up to `timeout`.
    ///
    /// `Ok(None)` means nothing arrived; a frame that arrived but failed to
    /// unwrap is [`RadioError::Decode`]. The transceiver is idle again on
    /// every return.
    pub fn recv(&mut self, timeout: Duration) -> Result<Option<Packet>, RadioError> {
        self.tx_on.set_low();
        self.rx_on.set_high();
        let result = self.listen(timeout);
        let idle = self
            .device
            .try_transaction(|radio| radio.set_idle().map_err(RadioError::from));
        self.rx_on.set_low();
        let packet = result?;
        idle?;
        Ok(packet)
    }

    fn listen(&mut self, timeout: Duration) -> Result<Option<Packet>, RadioError> {
        let mut buf = vec![0u8; self.max_frame.max(codec::RADIO_MAX_FRAME)];
        let deadline = self.clock.now() + timeout;
        loop {
            let received = self.device.try_transaction(|radio| {
                if radio.available()? {
                    Ok::<_, RadioError>(radio.recv(&mut buf)?)
                } else {
                    Ok(None)
                }
            })?;
            if let Some(len) = received {
                let packet = codec::unwrap(&buf[..len]).map_err(RadioError::Decode)?;
                tracing::debug!(len, packet = %packet, "radio received");
                return Ok(Some(packet));
            }

            let now = self.clock.now();
            if now >= deadline {
                return Ok(None);
            }
            self.clock.sleep(self.config.poll_interval.min(deadline - now));
        }
    }

    /// Receive window for the current outbound backlog.
    ///
    /// Each queued packet shortens the window by one backlog step, never
    /// below the floor.
    pub fn receive_timeout(&self, backlog: usize) -> Duration {
        let steps = u32::try_from(backlog).unwrap_or(u32::MAX);
        self.config
            .receive_timeout
            .saturating_sub(self.config.backlog_step.saturating_mul(steps))
            .max(self.config.min_receive_timeout)
    }
}
