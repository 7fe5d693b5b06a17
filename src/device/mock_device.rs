use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{DeviceDriver, DeviceError, NetDevice};

/// Frame captured by [`MockDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmittedFrame {
    pub device: String,
    pub ty: u16,
    pub data: Vec<u8>,
    pub dst: Option<Vec<u8>>,
}

/// Mock device driver, used for testing
///
/// Counts every callback, records transmitted frames and can be told to fail
/// any of its operations. Clones share state.
#[derive(Clone, Default)]
pub struct MockDriver {
    inner: Arc<MockDriverInner>,
}

#[derive(Default)]
struct MockDriverInner {
    opens: AtomicUsize,
    closes: AtomicUsize,
    transmits: AtomicUsize,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    fail_transmit: AtomicBool,
    frames: Mutex<Vec<TransmittedFrame>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_close(&self, fail: bool) {
        self.inner.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transmit(&self, fail: bool) {
        self.inner.fail_transmit.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Number of transmit calls, including failed ones
    pub fn transmit_count(&self) -> usize {
        self.inner.transmits.load(Ordering::SeqCst)
    }

    /// Frames accepted so far, oldest first
    pub fn frames(&self) -> Vec<TransmittedFrame> {
        self.inner
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn failure(dev: &NetDevice, op: &str) -> DeviceError {
        DeviceError::Driver {
            name: dev.name().to_string(),
            reason: format!("mock {} failure", op),
        }
    }
}

impl DeviceDriver for MockDriver {
    fn open(&self, dev: &NetDevice) -> Result<(), DeviceError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(Self::failure(dev, "open"));
        }
        Ok(())
    }

    fn close(&self, dev: &NetDevice) -> Result<(), DeviceError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_close.load(Ordering::SeqCst) {
            return Err(Self::failure(dev, "close"));
        }
        Ok(())
    }

    fn transmit(
        &self,
        dev: &NetDevice,
        ty: u16,
        data: &[u8],
        dst: Option<&[u8]>,
    ) -> Result<(), DeviceError> {
        self.inner.transmits.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_transmit.load(Ordering::SeqCst) {
            return Err(Self::failure(dev, "transmit"));
        }
        let mut frames = self
            .inner
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        frames.push(TransmittedFrame {
            device: dev.name().to_string(),
            ty,
            data: data.to_vec(),
            dst: dst.map(|d| d.to_vec()),
        });
        Ok(())
    }
}
