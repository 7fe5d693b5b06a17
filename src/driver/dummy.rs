//! Discard device: accepts every frame and drops it. Never receives.

use log::debug;
use std::sync::Arc;

use crate::device::{DeviceDriver, DeviceError, DeviceType, NetDevice};
use crate::stack::NetStack;

pub const DUMMY_MTU: u16 = u16::MAX;

/// Discard driver
#[derive(Debug, Clone, Copy, Default)]
pub struct Dummy;

impl DeviceDriver for Dummy {
    fn transmit(
        &self,
        dev: &NetDevice,
        ty: u16,
        data: &[u8],
        _dst: Option<&[u8]>,
    ) -> Result<(), DeviceError> {
        debug!("dev={}, type=0x{:04x}, len={}", dev.name(), ty, data.len());
        Ok(())
    }
}

/// Create and register a discard device
pub fn init(stack: &mut NetStack) -> Arc<NetDevice> {
    let mtu = stack.config().dummy.mtu;
    let dev = stack.register_device(
        NetDevice::builder(Dummy)
            .with_type(DeviceType::Dummy)
            .with_mtu(mtu),
    );
    debug!("initialized, dev={}", dev.name());
    dev
}
