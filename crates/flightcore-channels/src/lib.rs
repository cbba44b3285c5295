//! Channels, scheduling and routing for the flight core.
//!
//! The onboard computer runs one channel per external endpoint:
//! - **radio**: the ground link over the SPI transceiver
//! - **pdu**: the power-distribution unit over a line-oriented UART protocol
//! - **companion**: the companion computer over a SLIP-framed UART, started
//!   only while it is powered
//!
//! Channels exchange [`Packet`](flightcore_packet::Packet)s through bounded
//! queues on a shared [`Backplane`]. Everything a channel receives lands on
//! the inbound queue, and the [`Router`] moves it to the queue of the channel
//! that should handle it.

pub mod backplane;
pub mod companion;
pub mod config;
pub mod deployment;
pub mod error;
pub mod pdu;
pub mod queue;
pub mod radio;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod sensors;

pub use backplane::{Backplane, PowerLine, SENSOR_BUS};
pub use companion::{CompanionChannel, CompanionLauncher, LinkFactory};
pub use config::{
    CompanionConfig, FlightConfig, PduConfig, QueueConfig, RadioConfig, RouterConfig,
    SchedulerConfig,
};
pub use deployment::{DeploymentState, DeploymentStore, FlagFileStore, MemoryStore};
pub use error::{ConfigError, PduError, RadioError, SchedulerError};
pub use pdu::{PduChannel, PduEngine, PduReply, PduRequest, SimPdu, SwitchCache};
pub use queue::ChannelQueue;
pub use radio::{RadioChannel, RadioTransport};
pub use router::{Routed, Router};
pub use runtime::{FlightCore, Hardware, SimBench};
pub use scheduler::{CancelToken, Channel, ChannelContext, ChannelState, Scheduler};
pub use sensors::{Sensors, SimSensors};
