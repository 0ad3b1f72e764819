//! Cancellation for long running sync loops.
use crate::Result;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use tracing::info;

/// Owner side of the shutdown signal.
///
/// Calling [trigger](Shutdown::trigger) or dropping the handle makes every cloned
/// [ShutdownSignal] report shutdown.
#[derive(Debug)]
pub struct Shutdown {
    _sender: Sender<()>,
}

/// Receiver side of the shutdown signal, checked by sync loops.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: Receiver<()>,
}

impl Shutdown {
    /// Create a new handle along with its signal.
    pub fn new() -> (Shutdown, ShutdownSignal) {
        let (sender, receiver) = channel::bounded(0);
        (Shutdown { _sender: sender }, ShutdownSignal { receiver })
    }

    /// Request shutdown.
    pub fn trigger(self) {}

    /// Request shutdown when the process receives Ctrl+C or SIGTERM.
    ///
    /// Only one handler can be installed per process.
    pub fn trigger_on_interrupt(self) -> Result<()> {
        ctrlc::set_handler(self.into_trigger())?;
        Ok(())
    }

    /// Turn the handle into a callback which requests shutdown on its first call.
    pub fn into_trigger(self) -> impl FnMut() + Send + 'static {
        let mut handle = Some(self);
        move || {
            if let Some(handle) = handle.take() {
                info!("Received interrupt signal, stopping sync.");
                handle.trigger();
            }
        }
    }
}

impl ShutdownSignal {
    /// A signal which never fires.
    pub fn never() -> ShutdownSignal {
        ShutdownSignal {
            receiver: channel::never(),
        }
    }

    /// Is shutdown requested.
    pub fn is_triggered(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration`, wake up early when shutdown is requested.
    ///
    /// Returns false if shutdown is requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
            // nobody sends through the channel, treat a message as an early wake up.
            Ok(()) => !self.is_triggered(),
        }
    }
}
