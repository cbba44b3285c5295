use std::fmt;
use std::io;

use flightcore_channels::{ConfigError, SchedulerError};
use flightcore_packet::PacketError;

// Exit codes follow sysexits where one fits.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const CONFIG_INVALID: i32 = 78;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn packet_error(context: &str, err: PacketError) -> CliError {
    match err {
        PacketError::Io(source) => io_error(context, source),
        PacketError::ConnectionClosed | PacketError::ShortWrite { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::Read { source, path } => {
            io_error(&format!("failed reading {}", path.display()), source)
        }
        ConfigError::Parse(err) => CliError::new(CONFIG_INVALID, format!("invalid config: {err}")),
    }
}

pub fn scheduler_error(context: &str, err: SchedulerError) -> CliError {
    CliError::new(INTERNAL, format!("{context}: {err}"))
}
