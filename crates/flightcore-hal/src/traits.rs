use std::io::{Read, Write};

use crate::error::Result;

/// A byte-oriented serial connection owned by exactly one channel.
///
/// Reads are non-blocking: when nothing is buffered, `read` returns an
/// error of kind [`std::io::ErrorKind::WouldBlock`].
pub trait SerialPort: Read + Write + Send {
    /// Number of bytes that can be read without blocking.
    fn available(&self) -> usize;
}

impl<T: SerialPort + ?Sized> SerialPort for Box<T> {
    fn available(&self) -> usize {
        (**self).available()
    }
}

/// Settings applied when a radio transceiver is initialised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioSettings {
    /// Carrier frequency in MHz.
    pub frequency_mhz: f32,
    /// Transmit power in dBm.
    pub tx_power_dbm: i8,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            frequency_mhz: 433.0,
            tx_power_dbm: 20,
        }
    }
}

/// A half-duplex packet radio on the SPI bus.
///
/// Every method is a single bus transaction; callers hold the bus lock
/// while invoking them.
pub trait RadioDevice: Send {
    /// Bring the transceiver up with the given settings.
    fn init(&mut self, settings: &RadioSettings) -> Result<()>;

    /// Largest frame the hardware accepts.
    fn max_message_len(&self) -> usize;

    /// Load a frame into the transmit FIFO and start transmission.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Whether the last queued frame has left the antenna.
    fn packet_sent(&mut self) -> Result<bool>;

    /// Whether a received frame is waiting in the FIFO.
    fn available(&mut self) -> Result<bool>;

    /// Copy the waiting frame into `buf`, returning its length.
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Enter the low-power sleep state.
    fn sleep(&mut self) -> Result<()>;

    /// Enter the idle state.
    fn set_idle(&mut self) -> Result<()>;
}

/// A digital output line (enable lines, antenna switches).
pub trait OutputPin: Send {
    fn set_high(&mut self);
    fn set_low(&mut self);
    fn is_set_high(&self) -> bool;

    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

impl<T: OutputPin + ?Sized> OutputPin for Box<T> {
    fn set_high(&mut self) {
        (**self).set_high();
    }

    fn set_low(&mut self) {
        (**self).set_low();
    }

    fn is_set_high(&self) -> bool {
        (**self).is_set_high()
    }
}
