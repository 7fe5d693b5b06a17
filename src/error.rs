use thiserror::Error;

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::intr::IrqError;

/// Stack-wide error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Memory for a device, binding or queue entry could not be obtained
    AllocationFailure,
    /// Double open, double close, output on a closed device
    StateConflict,
    /// Frame longer than the MTU, or a full driver queue
    CapacityExceeded,
    /// Interrupt line already taken exclusively
    RegistrationConflict,
    /// A driver or interrupt handler reported failure
    DriverFailure,
    /// The interrupt dispatcher could not be started or is gone
    Startup,
    /// Invalid configuration
    Config,
}

/// Errors returned by the stack lifecycle
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Interrupt error: {0}")]
    Irq(#[from] IrqError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl StackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StackError::Device(e) => e.kind(),
            StackError::Irq(e) => e.kind(),
            StackError::Config(_) => ErrorKind::Config,
        }
    }
}
