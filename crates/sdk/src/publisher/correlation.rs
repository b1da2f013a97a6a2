//! Single-slot correlation table.
//!
//! At most one send is in flight per publisher, so the table is one optional
//! entry rather than a map. The entry is written by the sending task (under
//! the publisher gate) and taken either by the background reader, when a
//! matching acknowledgement arrives, or by the sender, on timeout or
//! cancellation. Whoever takes it first resolves it; the other side sees an
//! empty slot.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::frame::Acknowledgement;

/// How a pending send was resolved by someone other than the sender.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// The hub acknowledged the frame.
    Acknowledged(Acknowledgement),
    /// The stream failed before an acknowledgement arrived.
    Failed(TransportError),
    /// The publisher was disposed.
    Disposed,
}

#[derive(Debug)]
struct PendingSend {
    correlation_id: String,
    tx: oneshot::Sender<Resolution>,
}

#[derive(Debug, Default)]
pub(crate) struct CorrelationSlot {
    pending: Mutex<Option<PendingSend>>,
}

impl CorrelationSlot {
    /// Register the live entry and return the receiver its resolution is
    /// delivered on.
    pub(crate) fn register(&self, correlation_id: String) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        // Anything still here belongs to a send whose future was dropped.
        *self.pending.lock() = Some(PendingSend { correlation_id, tx });
        rx
    }

    /// Resolve the live entry if the acknowledgement belongs to it.
    ///
    /// An acknowledgement for any other correlation id is handed back
    /// untouched and the live entry is left as it was.
    pub(crate) fn acknowledge(&self, ack: Acknowledgement) -> Result<(), Acknowledgement> {
        let mut pending = self.pending.lock();
        match pending.take_if(|entry| entry.correlation_id == ack.correlation_id) {
            Some(entry) if !entry.tx.is_closed() => {
                let _ = entry.tx.send(Resolution::Acknowledged(ack));
                Ok(())
            }
            _ => Err(ack),
        }
    }

    /// Resolve whatever entry is live. Hands the resolution back when nothing
    /// is in flight or its sender has gone away.
    pub(crate) fn fail(&self, resolution: Resolution) -> Result<(), Resolution> {
        match self.pending.lock().take() {
            Some(entry) if !entry.tx.is_closed() => {
                let _ = entry.tx.send(resolution);
                Ok(())
            }
            _ => Err(resolution),
        }
    }

    /// Drop the entry for `correlation_id` without resolving it.
    ///
    /// Returns `false` if the entry was already taken, in which case its
    /// resolution is waiting on the receiver.
    pub(crate) fn clear(&self, correlation_id: &str) -> bool {
        self.pending
            .lock()
            .take_if(|entry| entry.correlation_id == correlation_id)
            .is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}
