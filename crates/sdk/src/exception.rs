//! Exception fan-out for errors raised off the caller's path.
//!
//! The subscriber's receive loop reports every inbound failure here. Two
//! kinds of consumer are supported:
//!
//! - synchronous listeners, attached with [`ExceptionSink::attach`] and
//!   invoked in attach order on the receive loop itself;
//! - broadcast receivers from [`ExceptionSink::subscribe`], for async
//!   consumers. Slow receivers drop events independently.
//!
//! A listener that fails or panics is logged and skipped. It never reaches
//! the receive loop and never prevents later listeners from running.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::error;

use crate::error::InboundError;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One reported failure.
#[derive(Debug, Clone)]
pub struct ExceptionEvent {
    pub error: Arc<InboundError>,
    /// `true` when the subscriber stopped itself because of this error.
    pub is_fatal: bool,
}

/// Receives [`ExceptionEvent`]s synchronously.
///
/// Implemented for any `Fn(&ExceptionEvent) -> eyre::Result<()>`.
pub trait ExceptionListener: Send + Sync + 'static {
    fn on_exception(&self, event: &ExceptionEvent) -> eyre::Result<()>;
}

impl<F> ExceptionListener for F
where
    F: Fn(&ExceptionEvent) -> eyre::Result<()> + Send + Sync + 'static,
{
    fn on_exception(&self, event: &ExceptionEvent) -> eyre::Result<()> {
        self(event)
    }
}

/// Handle returned by [`ExceptionSink::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct SinkInner {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ExceptionListener>)>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<ExceptionEvent>,
}

/// Observer list shared between a subscriber and its receive loop.
#[derive(Clone)]
pub struct ExceptionSink {
    inner: Arc<SinkInner>,
}

impl fmt::Debug for ExceptionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionSink")
            .field("listeners", &self.listener_count())
            .field("receivers", &self.inner.tx.receiver_count())
            .finish()
    }
}

impl Default for ExceptionSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ExceptionSink {
    /// Create a sink whose broadcast channel buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(SinkInner {
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                tx,
            }),
        }
    }

    pub fn attach(&self, listener: impl ExceptionListener) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the listener was not attached.
    pub fn detach(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExceptionEvent> {
        self.inner.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Detach every listener.
    pub fn clear(&self) {
        self.inner.listeners.write().clear();
    }

    pub(crate) fn notify(&self, error: InboundError, is_fatal: bool) {
        let event = ExceptionEvent {
            error: Arc::new(error),
            is_fatal,
        };

        // Listeners may attach or detach from inside a callback.
        let listeners = self.inner.listeners.read().clone();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_exception(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(report)) => {
                    error!(
                        listener = %id,
                        error = %report,
                        inbound_error = %event.error,
                        "Exception listener failed"
                    );
                }
                Err(_) => {
                    error!(
                        listener = %id,
                        inbound_error = %event.error,
                        "Exception listener failed: panicked"
                    );
                }
            }
        }

        let _ = self.inner.tx.send(event);
    }
}
