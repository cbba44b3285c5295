use std::time::Duration;

/// Errors raised by hardware devices and bus access.
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// An I/O error occurred on a serial device.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device rejected an operation.
    #[error("{device} failure: {message}")]
    Device {
        device: &'static str,
        message: String,
    },

    /// The calling thread already holds another bus lock.
    #[error("cannot acquire bus {requested} while holding bus {held}")]
    BusAlreadyHeld {
        held: &'static str,
        requested: &'static str,
    },

    /// A device operation did not complete in time.
    #[error("{device} timed out after {timeout:?}")]
    Timeout {
        device: &'static str,
        timeout: Duration,
    },
}

impl HalError {
    pub fn device(device: &'static str, message: impl Into<String>) -> Self {
        Self::Device {
            device,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HalError>;
