//! Device layer of a user-space network protocol stack
//!
//! - `device`: device records, the driver trait and the device registry
//! - `intr`: software interrupts delivered by a single dispatcher thread
//! - `driver`: the loopback and discard drivers
//! - `stack`: setup/running lifecycle tying the above together
//! - `input`: the upward delivery entry point

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod input;
pub mod intr;
pub mod stack;

pub use config::{ConfigError, StackConfig};
pub use device::{DeviceDriver, DeviceError, DeviceFlags, DeviceType, NetDevice};
pub use error::{ErrorKind, StackError};
pub use input::{InputHandler, LogInput, RecordingInput};
pub use intr::{IrqError, IrqFlags, IrqHandler, IrqRaiser};
pub use stack::{NetStack, RunningStack};
