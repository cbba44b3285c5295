//! Hardware seams for the flight core.
//!
//! Channels never touch registers directly. They talk to devices through
//! the traits defined here:
//! - [`SerialPort`] for the PDU and companion-computer UARTs
//! - [`RadioDevice`] for the SPI transceiver
//! - [`OutputPin`] for enable and antenna-switch lines
//! - [`Clock`] for every delay and timeout
//!
//! Shared buses are wrapped in a [`BusLock`], which only exposes the device
//! inside a scoped transaction. The [`sim`] module provides in-memory
//! devices for host runs and tests.

pub mod bus;
pub mod clock;
pub mod error;
pub mod sim;
pub mod traits;

pub use bus::{held_bus, BusLock};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HalError, Result};
pub use traits::{OutputPin, RadioDevice, RadioSettings, SerialPort};
