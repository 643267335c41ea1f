//! Coalescing rerun trigger.
//!
//! A [`Trigger`] records that "a rerun is owed". The channel holds at most one
//! pending signal: firing while a signal is already pending is a no-op, so a
//! burst of matching changes collapses into a single rerun. No ordering or
//! count information survives, only "at least one fire since the last drain".
//!
//! ```text
//!  watcher ──┐
//!  watcher ──┼──► Trigger ──► [ slot ] ──► TriggerReceiver ──► supervisor
//!  user    ──┘      (try_send, drop when full)
//! ```

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

/// Create a connected trigger pair with a single pending slot.
pub fn channel() -> (Trigger, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (Trigger { tx }, TriggerReceiver { rx })
}

/// Outcome of [`Trigger::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// The slot was empty and now holds a pending trigger.
    Pending,

    /// A trigger was already pending; this one was folded into it.
    Coalesced,

    /// The receiving side is gone.
    Closed,
}

/// Sending half. Cheap to clone; every watcher task holds one.
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    /// Record that a rerun is owed. Never blocks.
    pub fn fire(&self) -> Fired {
        match self.tx.try_send(()) {
            Ok(()) => Fired::Pending,
            Err(TrySendError::Full(())) => {
                trace!("trigger already pending, coalesced");
                Fired::Coalesced
            }
            Err(TrySendError::Closed(())) => Fired::Closed,
        }
    }
}

/// Receiving half, owned by the single consumer.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<()>,
}

impl TriggerReceiver {
    /// Wait for a pending trigger and drain it.
    ///
    /// Returns `None` once every [`Trigger`] has been dropped and nothing is
    /// pending.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Drain a pending trigger without waiting.
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
