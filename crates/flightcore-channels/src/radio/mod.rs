//! Ground link over the SPI transceiver.

pub mod channel;
pub mod transport;

pub use channel::{is_downlink, RadioChannel, DOWNLINK_TYPES};
pub use transport::{RadioTransport, RADIO_BUS};
