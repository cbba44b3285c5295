use std::path::PathBuf;
use std::time::Duration;

use flightcore_packet::{ChannelId, Switch, SwitchState};

/// Errors raised by the channel scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// No registered channel has the requested identity.
    #[error("channel {0} not found")]
    NotFound(ChannelId),

    /// A channel with this identity is already running.
    #[error("channel {0} already running")]
    AlreadyRunning(ChannelId),

    /// The execution context could not be created.
    #[error("failed to spawn channel {name}: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Errors raised by the PDU protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum PduError {
    /// No acceptable reply arrived within the reply timeout.
    #[error("no reply from PDU within {0:?}")]
    Timeout(Duration),

    /// Serial I/O failed.
    #[error("PDU serial error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply line could not be decoded.
    #[error("malformed PDU reply: {0}")]
    MalformedReply(String),

    /// The PDU answered with a different state than requested.
    #[error("switch {switch} reported {reported}, requested {requested}")]
    NotConfirmed {
        switch: Switch,
        requested: SwitchState,
        reported: SwitchState,
    },

    /// The switch is not controlled by the PDU.
    #[error("switch {0} is not a PDU switch")]
    InvalidSwitch(Switch),

    /// The deployment marker could not be read or written.
    #[error("deployment store error at {path}: {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised by the radio transport.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    /// The packet could not be wrapped within the radio frame limit.
    #[error("cannot encode packet for radio: {0}")]
    Encode(flightcore_packet::PacketError),

    /// A frame was received but could not be unwrapped.
    #[error("received undecodable frame: {0}")]
    Decode(flightcore_packet::PacketError),

    /// The transceiver never confirmed the transmission.
    #[error("transmission not confirmed within {0:?}")]
    SendUnconfirmed(Duration),

    /// The transceiver or its bus failed.
    #[error("radio hardware error: {0}")]
    Hal(#[from] flightcore_hal::HalError),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for the expected schema.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
