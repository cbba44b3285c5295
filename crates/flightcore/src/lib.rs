//! Onboard command and telemetry core for small satellites.
//!
//! The flight computer moves packets between the ground radio, the power
//! distribution unit and a companion computer. Each endpoint runs as its own
//! channel and a router decides where every packet goes.
//!
//! # Crate Structure
//!
//! - [`hal`]: hardware seams (serial, radio, pins, clock, bus locks) and simulated devices
//! - [`packet`]: packet model, radio wrapping, SLIP framing, commands and beacons
//! - [`channels`]: queues, scheduler, PDU/radio/companion channels and the router

/// Re-export hardware abstraction types.
pub mod hal {
    pub use flightcore_hal::*;
}

/// Re-export packet types.
pub mod packet {
    pub use flightcore_packet::*;
}

/// Re-export channel and routing types.
pub mod channels {
    pub use flightcore_channels::*;
}
