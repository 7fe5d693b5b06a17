use std::io;
use thiserror::Error;

use crate::error::ErrorKind;

/// Software interrupt errors
#[derive(Debug, Error)]
pub enum IrqError {
    #[error("IRQ {irq} ({name}) conflicts with an already registered handler")]
    Conflict { irq: u32, name: String },

    #[error("Failed to spawn interrupt dispatcher: {0}")]
    Spawn(#[from] io::Error),

    #[error("Interrupt dispatcher exited before becoming ready")]
    NotReady,

    #[error("Interrupt dispatcher is not running")]
    DispatcherStopped,

    #[error("Interrupt handler {name} failed: {reason}")]
    Handler { name: String, reason: String },
}

impl IrqError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IrqError::Conflict { .. } => ErrorKind::RegistrationConflict,
            IrqError::Spawn(_) | IrqError::NotReady | IrqError::DispatcherStopped => {
                ErrorKind::Startup
            }
            IrqError::Handler { .. } => ErrorKind::DriverFailure,
        }
    }
}
