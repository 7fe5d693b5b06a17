use thiserror::Error;

use crate::error::ErrorKind;

/// Network device operation errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Failed to allocate {what}")]
    AllocationFailure { what: &'static str },

    #[error("Device already opened: {name}")]
    AlreadyOpened { name: String },

    #[error("Device not opened: {name}")]
    NotOpened { name: String },

    #[error("Frame too long for {name}: mtu={mtu}, len={len}")]
    TooLong { name: String, mtu: u16, len: usize },

    #[error("Transmit queue of {name} is full ({limit} entries)")]
    QueueFull { name: String, limit: usize },

    #[error("Driver failure on {name}: {reason}")]
    Driver { name: String, reason: String },
}

impl DeviceError {
    /// Classify the error into the stack-wide taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            DeviceError::AlreadyOpened { .. } | DeviceError::NotOpened { .. } => {
                ErrorKind::StateConflict
            }
            DeviceError::TooLong { .. } | DeviceError::QueueFull { .. } => {
                ErrorKind::CapacityExceeded
            }
            DeviceError::Driver { .. } => ErrorKind::DriverFailure,
        }
    }
}
