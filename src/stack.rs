//! Protocol stack lifecycle
//!
//! A stack is built in two phases. [`NetStack`] is the setup phase: drivers
//! register devices and request interrupt lines. [`NetStack::run`] consumes
//! it, starts the interrupt dispatcher, opens every device and returns a
//! [`RunningStack`], which can send traffic but has no way to add devices or
//! bindings.

use log::{debug, error, info};
use std::sync::Arc;

use crate::config::StackConfig;
use crate::device::{DeviceRegistry, NetDevice, NetDeviceBuilder};
use crate::error::StackError;
use crate::input::{InputHandler, LogInput};
use crate::intr::{IrqController, IrqDispatcher, IrqError, IrqFlags, IrqHandler, IrqRaiser};

/// Protocol stack in its setup phase
pub struct NetStack {
    config: StackConfig,
    devices: DeviceRegistry,
    irq: IrqController,
    input: Arc<dyn InputHandler>,
}

impl NetStack {
    /// Initialize a stack whose received frames are only logged
    pub fn new(config: StackConfig) -> Result<Self, StackError> {
        Self::with_input(config, LogInput)
    }

    /// Initialize a stack delivering received frames to `input`
    pub fn with_input(
        config: StackConfig,
        input: impl InputHandler + 'static,
    ) -> Result<Self, StackError> {
        config.validate()?;
        info!("initialized");
        Ok(Self {
            config,
            devices: DeviceRegistry::new(),
            irq: IrqController::new(),
            input: Arc::new(input),
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Register a device; index and name are assigned here
    pub fn register_device(&mut self, builder: NetDeviceBuilder) -> Arc<NetDevice> {
        self.devices.register(builder)
    }

    /// Bind an interrupt handler, see [`IrqController::request_irq`]
    pub fn request_irq(
        &mut self,
        irq: u32,
        handler: impl IrqHandler + 'static,
        flags: IrqFlags,
        name: &str,
    ) -> Result<(), IrqError> {
        self.irq.request_irq(irq, handler, flags, name)
    }

    pub fn irq_raiser(&self) -> IrqRaiser {
        self.irq.raiser()
    }

    /// Input entry point drivers deliver received frames to
    pub fn input_handler(&self) -> Arc<dyn InputHandler> {
        Arc::clone(&self.input)
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    /// Start the interrupt dispatcher, then open every device
    ///
    /// Failing to start the dispatcher is fatal; a device that fails to open
    /// is logged and left closed.
    pub fn run(self) -> Result<RunningStack, StackError> {
        let NetStack { devices, irq, .. } = self;
        let dispatcher = irq.run().map_err(|e| {
            error!("interrupt dispatcher failure: {}", e);
            e
        })?;
        devices.run_all();
        info!("running, devices={}", devices.len());
        Ok(RunningStack {
            devices,
            dispatcher: Some(dispatcher),
        })
    }
}

/// Protocol stack with its dispatcher running
///
/// Dropping it without calling [`shutdown`](RunningStack::shutdown) shuts it
/// down anyway.
pub struct RunningStack {
    devices: DeviceRegistry,
    dispatcher: Option<IrqDispatcher>,
}

impl RunningStack {
    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<&Arc<NetDevice>> {
        self.devices.get(name)
    }

    /// Send one frame through `dev`
    pub fn output(
        &self,
        dev: &NetDevice,
        ty: u16,
        data: &[u8],
        dst: Option<&[u8]>,
    ) -> Result<(), StackError> {
        dev.output(ty, data, dst)?;
        Ok(())
    }

    /// Raise an interrupt line by hand
    pub fn raise(&self, irq: u32) -> Result<(), StackError> {
        let dispatcher = self.dispatcher.as_ref().ok_or(IrqError::DispatcherStopped)?;
        dispatcher.raise(irq)?;
        Ok(())
    }

    pub fn irq_raiser(&self) -> Option<IrqRaiser> {
        self.dispatcher.as_ref().map(IrqDispatcher::raiser)
    }

    /// Close every device, then stop the dispatcher
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        self.devices.shutdown_all();
        dispatcher.shutdown();
        debug!("shut down");
    }
}

impl Drop for RunningStack {
    fn drop(&mut self) {
        self.stop();
    }
}
