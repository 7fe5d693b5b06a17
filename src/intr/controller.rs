//! Software interrupt controller
//!
//! Drivers bind handlers to interrupt lines while the stack is being set up.
//! `run` moves the bindings into a single dispatcher thread; from then on a
//! driver signals "data ready" with [`IrqRaiser::raise`], and the dispatcher
//! calls every handler bound to that line.

use bitflags::bitflags;
use log::{debug, error, warn};
use std::collections::BTreeSet;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use super::{IrqError, IrqHandler};

/// First line number available to drivers
pub const IRQ_BASE: u32 = 35;
/// Line used by the loopback driver
pub const IRQ_LOOPBACK: u32 = IRQ_BASE + 1;
/// Binding names are truncated to `IRQ_NAME_LEN - 1` bytes
pub const IRQ_NAME_LEN: usize = 16;

bitflags! {
    /// Interrupt binding flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IrqFlags: u8 {
        /// The line may be shared with other SHARED bindings
        const SHARED = 0x01;
    }
}

impl IrqFlags {
    /// The line belongs to this binding alone
    pub const EXCLUSIVE: IrqFlags = IrqFlags::empty();
}

/// Message on the dispatcher channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IrqMessage {
    Raise(u32),
    Terminate,
}

struct IrqEntry {
    irq: u32,
    handler: Box<dyn IrqHandler>,
    flags: IrqFlags,
    name: String,
}

impl fmt::Debug for IrqEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqEntry")
            .field("irq", &self.irq)
            .field("flags", &self.flags)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Interrupt controller in its setup phase
///
/// Only this type can register handlers. It is consumed by [`run`], so no
/// binding can be added once the dispatcher is listening.
///
/// [`run`]: IrqController::run
pub struct IrqController {
    /// Oldest first; dispatch walks it backwards
    entries: Vec<IrqEntry>,
    watched: BTreeSet<u32>,
    tx: Sender<IrqMessage>,
    rx: Receiver<IrqMessage>,
}

impl Default for IrqController {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqController {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            entries: Vec::new(),
            watched: BTreeSet::new(),
            tx,
            rx,
        }
    }

    /// Bind `handler` to line `irq`
    ///
    /// # Arguments
    /// * `irq` - line number
    /// * `handler` - called with `irq` each time the line is raised
    /// * `flags` - `IrqFlags::SHARED` to allow other shared bindings on the line
    /// * `name` - diagnostic name, truncated to 15 bytes
    ///
    /// # Returns
    /// * `Err(IrqError::Conflict)` - the line is bound and either side is exclusive
    pub fn request_irq(
        &mut self,
        irq: u32,
        handler: impl IrqHandler + 'static,
        flags: IrqFlags,
        name: &str,
    ) -> Result<(), IrqError> {
        debug!("irq={}, flags={:?}, name={}", irq, flags, name);
        let conflict = self.entries.iter().any(|entry| {
            entry.irq == irq
                && !(entry.flags.contains(IrqFlags::SHARED) && flags.contains(IrqFlags::SHARED))
        });
        if conflict {
            error!("conflicts with already registered IRQs, irq={}", irq);
            return Err(IrqError::Conflict {
                irq,
                name: name.to_string(),
            });
        }

        let name = truncate_name(name);
        debug!("registered: irq={}, name={}", irq, name);
        self.entries.push(IrqEntry {
            irq,
            handler: Box::new(handler),
            flags,
            name,
        });
        self.watched.insert(irq);
        Ok(())
    }

    /// Handle for raising interrupts, usable before and after `run`
    ///
    /// Raises issued before the dispatcher starts are queued and serviced as
    /// soon as it is listening.
    pub fn raiser(&self) -> IrqRaiser {
        IrqRaiser {
            tx: self.tx.clone(),
        }
    }

    /// Whether some binding watches `irq`
    pub fn is_watched(&self, irq: u32) -> bool {
        self.watched.contains(&irq)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the dispatcher thread
    ///
    /// Returns once the dispatcher is waiting for interrupts.
    pub fn run(self) -> Result<IrqDispatcher, IrqError> {
        let IrqController {
            entries,
            watched,
            tx,
            rx,
        } = self;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("irq-dispatch".to_string())
            .spawn(move || dispatch_loop(entries, watched, rx, ready_tx))
            .map_err(|e| {
                error!("failed to spawn interrupt dispatcher: {}", e);
                IrqError::Spawn(e)
            })?;

        if ready_rx.recv().is_err() {
            error!("interrupt dispatcher exited during startup");
            let _ = handle.join();
            return Err(IrqError::NotReady);
        }

        Ok(IrqDispatcher {
            tx,
            handle: Some(handle),
        })
    }
}

/// Cloneable handle that raises interrupt lines
///
/// Raising never blocks, whatever the dispatcher is doing.
#[derive(Clone, Debug)]
pub struct IrqRaiser {
    tx: Sender<IrqMessage>,
}

impl IrqRaiser {
    /// Signal line `irq` to the dispatcher
    ///
    /// # Returns
    /// * `Err(IrqError::DispatcherStopped)` - the dispatcher has shut down
    pub fn raise(&self, irq: u32) -> Result<(), IrqError> {
        self.tx
            .send(IrqMessage::Raise(irq))
            .map_err(|_| IrqError::DispatcherStopped)
    }
}

/// Running interrupt dispatcher
///
/// Shutting down (explicitly or on drop) terminates the dispatcher thread
/// and waits for it; no handler runs after that returns.
pub struct IrqDispatcher {
    tx: Sender<IrqMessage>,
    handle: Option<JoinHandle<()>>,
}

impl IrqDispatcher {
    pub fn raiser(&self) -> IrqRaiser {
        IrqRaiser {
            tx: self.tx.clone(),
        }
    }

    pub fn raise(&self, irq: u32) -> Result<(), IrqError> {
        self.tx
            .send(IrqMessage::Raise(irq))
            .map_err(|_| IrqError::DispatcherStopped)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the dispatcher and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.tx.send(IrqMessage::Terminate);
        if handle.join().is_err() {
            error!("interrupt dispatcher panicked");
        }
    }
}

impl Drop for IrqDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    entries: Vec<IrqEntry>,
    watched: BTreeSet<u32>,
    rx: Receiver<IrqMessage>,
    ready: SyncSender<()>,
) {
    debug!("start...");
    if ready.send(()).is_err() {
        return;
    }
    drop(ready);

    loop {
        match rx.recv() {
            Ok(IrqMessage::Terminate) => break,
            Ok(IrqMessage::Raise(irq)) => {
                if !watched.contains(&irq) {
                    warn!("no handler for irq={}", irq);
                    continue;
                }
                for entry in entries.iter().rev().filter(|entry| entry.irq == irq) {
                    debug!("irq={}, name={}", entry.irq, entry.name);
                    let result = panic::catch_unwind(AssertUnwindSafe(|| entry.handler.handle(entry.irq)));
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!("handler failure, irq={}, name={}: {}", entry.irq, entry.name, e);
                        }
                        Err(payload) => {
                            error!(
                                "handler panicked, irq={}, name={}: {}",
                                entry.irq,
                                entry.name,
                                panic_message(payload.as_ref())
                            );
                        }
                    }
                }
            }
            Err(_) => {
                error!("interrupt channel closed");
                break;
            }
        }
    }
    debug!("terminated");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

fn truncate_name(name: &str) -> String {
    let mut end = name.len().min(IRQ_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
