use log::{debug, error, info};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::{NetDevice, NetDeviceBuilder};

/// Device indices are unique for the lifetime of the process
static NEXT_INDEX: AtomicU32 = AtomicU32::new(0);

/// Registered network devices
///
/// Devices are kept newest first. The registry hands out shared handles but
/// never removes a device.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<NetDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign index and name to `builder` and add it to the registry
    pub fn register(&mut self, builder: NetDeviceBuilder) -> Arc<NetDevice> {
        let index = NEXT_INDEX.fetch_add(1, Ordering::SeqCst);
        let dev = Arc::new(builder.build(index));
        self.devices.insert(0, Arc::clone(&dev));
        info!(
            "registered, dev={}, type=0x{:04x}",
            dev.name(),
            dev.kind().as_u16()
        );
        dev
    }

    /// Devices in registry order (most recently registered first)
    pub fn iter(&self) -> impl Iterator<Item = &Arc<NetDevice>> {
        self.devices.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NetDevice>> {
        self.devices.iter().find(|dev| dev.name() == name)
    }

    pub fn get_by_index(&self, index: u32) -> Option<&Arc<NetDevice>> {
        self.devices.iter().find(|dev| dev.index() == index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Open every device; failures are logged and skipped
    ///
    /// Returns the number of devices that were opened.
    pub fn run_all(&self) -> usize {
        debug!("open all devices...");
        let opened = self
            .devices
            .iter()
            .filter(|dev| match dev.open() {
                Ok(()) => true,
                Err(e) => {
                    error!("open failed, dev={}: {}", dev.name(), e);
                    false
                }
            })
            .count();
        debug!("running...");
        opened
    }

    /// Close every device; failures are logged and skipped
    ///
    /// Returns the number of devices that were closed.
    pub fn shutdown_all(&self) -> usize {
        debug!("close all devices...");
        let closed = self
            .devices
            .iter()
            .filter(|dev| match dev.close() {
                Ok(()) => true,
                Err(e) => {
                    error!("close failed, dev={}: {}", dev.name(), e);
                    false
                }
            })
            .count();
        debug!("shutting down");
        closed
    }
}
