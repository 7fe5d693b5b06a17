//! Loopback device
//!
//! Transmit does not deliver anything by itself: it queues a copy of the
//! frame and raises the device's interrupt line. The interrupt handler, on
//! the dispatcher thread, drains the queue into the stack's input handler,
//! the way a NIC hands received frames over from its interrupt context.

use bytes::Bytes;
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::LoopbackConfig;
use crate::device::{DeviceDriver, DeviceError, DeviceFlags, DeviceType, NetDevice};
use crate::error::StackError;
use crate::input::InputHandler;
use crate::intr::{IrqError, IrqFlags, IrqHandler, IrqRaiser};
use crate::stack::NetStack;

/// Largest IP datagram
pub const LOOPBACK_MTU: u16 = u16::MAX;
pub const LOOPBACK_QUEUE_LIMIT: usize = 16;

struct QueueEntry {
    ty: u16,
    data: Bytes,
}

/// Bounded FIFO between the transmit path and the interrupt handler
pub struct LoopbackQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    limit: usize,
}

impl LoopbackQueue {
    fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
        }
    }

    /// Frames waiting for the interrupt handler
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Loopback driver
pub struct Loopback {
    irq: u32,
    queue: Arc<LoopbackQueue>,
    raiser: IrqRaiser,
}

impl Loopback {
    pub fn new(config: &LoopbackConfig, raiser: IrqRaiser) -> Self {
        Self {
            irq: config.irq,
            queue: Arc::new(LoopbackQueue::new(config.queue_limit)),
            raiser,
        }
    }

    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// Shared handle on the transmit queue
    pub fn queue(&self) -> Arc<LoopbackQueue> {
        Arc::clone(&self.queue)
    }
}

impl DeviceDriver for Loopback {
    fn transmit(
        &self,
        dev: &NetDevice,
        ty: u16,
        data: &[u8],
        _dst: Option<&[u8]>,
    ) -> Result<(), DeviceError> {
        let num = {
            let mut entries = self
                .queue
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if entries.len() >= self.queue.limit {
                error!("queue is full, dev={}", dev.name());
                return Err(DeviceError::QueueFull {
                    name: dev.name().to_string(),
                    limit: self.queue.limit,
                });
            }
            let mut buf = Vec::new();
            buf.try_reserve_exact(data.len()).map_err(|_| {
                error!("failed to allocate queue entry, dev={}, len={}", dev.name(), data.len());
                DeviceError::AllocationFailure {
                    what: "loopback queue entry",
                }
            })?;
            buf.extend_from_slice(data);
            entries.push_back(QueueEntry {
                ty,
                data: Bytes::from(buf),
            });
            entries.len()
        };
        debug!(
            "queue pushed (num:{}), dev={}, type=0x{:04x}, len={}",
            num,
            dev.name(),
            ty,
            data.len()
        );

        // The frame stays queued; the next successful raise drains it.
        if let Err(e) = self.raiser.raise(self.irq) {
            warn!("failed to raise irq={}, dev={}: {}", self.irq, dev.name(), e);
        }
        Ok(())
    }
}

/// Interrupt handler draining one loopback device
struct LoopbackIsr {
    queue: Arc<LoopbackQueue>,
    device: Arc<NetDevice>,
    input: Arc<dyn InputHandler>,
}

impl LoopbackIsr {
    /// Deliver every queued frame, holding the queue lock throughout
    fn drain(&self) -> usize {
        let mut entries = self
            .queue
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        while let Some(entry) = entries.pop_front() {
            debug!(
                "queue popped (num:{}), dev={}, type=0x{:04x}, len={}",
                entries.len(),
                self.device.name(),
                entry.ty,
                entry.data.len()
            );
            self.input.deliver(entry.ty, &entry.data, &self.device);
            delivered += 1;
        }
        delivered
    }
}

impl IrqHandler for LoopbackIsr {
    fn handle(&self, irq: u32) -> Result<(), IrqError> {
        let delivered = self.drain();
        debug!("irq={}, dev={}, delivered={}", irq, self.device.name(), delivered);
        Ok(())
    }
}

/// Create, register and wire up a loopback device
///
/// The device shares its interrupt line, with itself as the handler owner.
pub fn init(stack: &mut NetStack) -> Result<Arc<NetDevice>, StackError> {
    let config = stack.config().loopback.clone();
    let driver = Loopback::new(&config, stack.irq_raiser());
    let queue = driver.queue();
    let irq = driver.irq();

    let dev = stack.register_device(
        NetDevice::builder(driver)
            .with_type(DeviceType::Loopback)
            .with_mtu(config.mtu)
            .with_flags(DeviceFlags::LOOPBACK),
    );
    let isr = LoopbackIsr {
        queue,
        device: Arc::clone(&dev),
        input: stack.input_handler(),
    };
    stack.request_irq(irq, isr, IrqFlags::SHARED, dev.name())?;
    debug!("initialized, dev={}", dev.name());
    Ok(dev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RecordingInput;
    use crate::intr::{IrqController, IRQ_LOOPBACK};

    struct Fixture {
        _ctrl: IrqController,
        queue: Arc<LoopbackQueue>,
        dev: Arc<NetDevice>,
        input: RecordingInput,
        isr: LoopbackIsr,
    }

    fn fixture(config: LoopbackConfig) -> Fixture {
        let ctrl = IrqController::new();
        let driver = Loopback::new(&config, ctrl.raiser());
        let queue = driver.queue();
        let dev = Arc::new(
            NetDevice::builder(driver)
                .with_type(DeviceType::Loopback)
                .with_mtu(config.mtu)
                .build(0),
        );
        dev.open().unwrap();
        let input = RecordingInput::new();
        let isr = LoopbackIsr {
            queue: Arc::clone(&queue),
            device: Arc::clone(&dev),
            input: Arc::new(input.clone()),
        };
        Fixture {
            _ctrl: ctrl,
            queue,
            dev,
            input,
            isr,
        }
    }

    #[test]
    fn test_transmit_is_deferred() {
        let f = fixture(LoopbackConfig::default());
        f.dev.output(0x0800, &[1, 2, 3], None).unwrap();

        assert_eq!(f.queue.len(), 1);
        assert!(f.input.is_empty());

        f.isr.handle(IRQ_LOOPBACK).unwrap();
        assert!(f.queue.is_empty());
        assert_eq!(f.input.len(), 1);
    }

    #[test]
    fn test_queue_bound_and_fifo_drain() {
        let f = fixture(LoopbackConfig::default());
        assert_eq!(f.queue.limit(), LOOPBACK_QUEUE_LIMIT);

        for i in 0..LOOPBACK_QUEUE_LIMIT {
            let ty = 0x0800 + i as u16;
            let data = vec![i as u8; i + 1];
            f.dev.output(ty, &data, None).unwrap();
        }
        let err = f.dev.output(0x0800, &[0xff], None).unwrap_err();
        assert!(matches!(err, DeviceError::QueueFull { limit: 16, .. }));
        assert_eq!(f.queue.len(), LOOPBACK_QUEUE_LIMIT);

        assert_eq!(f.isr.drain(), LOOPBACK_QUEUE_LIMIT);
        let frames = f.input.frames();
        assert_eq!(frames.len(), LOOPBACK_QUEUE_LIMIT);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.ty, 0x0800 + i as u16);
            assert_eq!(frame.data.len(), i + 1);
            assert!(frame.data.iter().all(|&b| b == i as u8));
            assert_eq!(frame.device, f.dev.name());
        }

        assert!(f.queue.is_empty());
        f.dev.output(0x0800, &[0xff], None).unwrap();
        assert_eq!(f.queue.len(), 1);
    }

    #[test]
    fn test_configured_queue_limit() {
        let config = LoopbackConfig {
            queue_limit: 2,
            ..Default::default()
        };
        let f = fixture(config);

        f.dev.output(0x0800, &[1], None).unwrap();
        f.dev.output(0x0800, &[2], None).unwrap();
        assert!(f.dev.output(0x0800, &[3], None).is_err());
    }

    #[test]
    fn test_drain_empty_queue() {
        let f = fixture(LoopbackConfig::default());
        assert_eq!(f.isr.drain(), 0);
        assert!(f.input.is_empty());
    }

    #[test]
    fn test_transmit_survives_stopped_dispatcher() {
        let ctrl = IrqController::new();
        let driver = Loopback::new(&LoopbackConfig::default(), ctrl.raiser());
        let queue = driver.queue();
        drop(ctrl);

        let dev = NetDevice::builder(driver).with_mtu(LOOPBACK_MTU).build(0);
        dev.open().unwrap();
        dev.output(0x0800, &[1], None).unwrap();
        assert_eq!(queue.len(), 1);
    }
}
