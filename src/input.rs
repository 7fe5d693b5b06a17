//! Upward delivery
//!
//! Drivers hand every received frame to the stack through an
//! [`InputHandler`]. Protocol dispatch by type does not exist yet, so the
//! default handler only logs what arrives.

use log::debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::device::NetDevice;

/// Input entry point of the protocol stack
pub trait InputHandler: Send + Sync {
    /// Deliver one received frame
    ///
    /// # Arguments
    /// * `ty` - 16-bit protocol type
    /// * `data` - payload
    /// * `dev` - device the frame arrived on
    fn deliver(&self, ty: u16, data: &[u8], dev: &NetDevice);
}

/// Logs every delivered frame and drops it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInput;

impl InputHandler for LogInput {
    fn deliver(&self, ty: u16, data: &[u8], dev: &NetDevice) {
        debug!("dev={}, type=0x{:04x}, len={}", dev.name(), ty, data.len());
    }
}

/// Frame seen by [`RecordingInput`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub ty: u16,
    pub data: Vec<u8>,
    pub device: String,
}

/// Records delivered frames, used for testing
#[derive(Debug, Clone, Default)]
pub struct RecordingInput {
    frames: Arc<Mutex<Vec<ReceivedFrame>>>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames delivered so far, in delivery order
    pub fn frames(&self) -> Vec<ReceivedFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` frames have been delivered
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        let check_interval = Duration::from_millis(5);

        loop {
            if self.len() >= count {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(check_interval);
        }
    }
}

impl InputHandler for RecordingInput {
    fn deliver(&self, ty: u16, data: &[u8], dev: &NetDevice) {
        debug!("dev={}, type=0x{:04x}, len={}", dev.name(), ty, data.len());
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames.push(ReceivedFrame {
            ty,
            data: data.to_vec(),
            device: dev.name().to_string(),
        });
    }
}
