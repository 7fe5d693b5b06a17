use super::{DeviceError, NetDevice};

/// Device driver trait
///
/// The operation table every network device carries. `open` and `close` are
/// optional and default to doing nothing; `transmit` must be implemented.
/// Driver private state lives in the implementing type.
pub trait DeviceDriver: Send + Sync {
    /// Bring the hardware (or its emulation) up
    ///
    /// Called before the device's UP flag is set. Must not call back into
    /// `open`/`close` of the same device.
    fn open(&self, _dev: &NetDevice) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Bring the hardware down
    fn close(&self, _dev: &NetDevice) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Send one frame
    ///
    /// # Arguments
    /// * `dev` - the device the frame is sent through
    /// * `ty` - 16-bit protocol type of the payload
    /// * `data` - payload, never longer than the device MTU
    /// * `dst` - link-layer destination address, if the device uses one
    ///
    /// # Returns
    /// * `Ok(())` - frame accepted by the driver
    /// * `Err(DeviceError)` - driver rejected the frame
    fn transmit(
        &self,
        dev: &NetDevice,
        ty: u16,
        data: &[u8],
        dst: Option<&[u8]>,
    ) -> Result<(), DeviceError>;
}
