use super::IrqError;

/// Interrupt handler trait
///
/// The implementing value owns whatever state the handler needs.
pub trait IrqHandler: Send + Sync {
    /// Service interrupt `irq`
    ///
    /// Runs on the dispatcher thread. A failure is logged by the dispatcher
    /// and does not stop it.
    fn handle(&self, irq: u32) -> Result<(), IrqError>;
}

impl<F> IrqHandler for F
where
    F: Fn(u32) -> Result<(), IrqError> + Send + Sync,
{
    fn handle(&self, irq: u32) -> Result<(), IrqError> {
        self(irq)
    }
}
