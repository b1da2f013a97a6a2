//! Receive, dispatch and acknowledge inbound messages.
//!
//! [`RtgsSubscriber`] owns a lifecycle state machine:
//!
//! ```text
//! NotStarted | Stopped ──start──▶ Starting ──stream opened──▶ Running
//! Starting ──connect failed──▶ previous state
//! Starting | Running ──stop──▶ Stopped
//! Running ──stream failure──▶ Stopped
//! any ──dispose──▶ Disposed (terminal)
//! ```
//!
//! The state sits behind a short-lived synchronous lock that the receive
//! loop also takes when it stops itself after a stream failure. Claiming
//! `Starting` happens under that lock, so exactly one concurrent start can
//! win. The connect itself runs with no lock held: stop and dispose cancel a
//! pending start instead of waiting for the hub to answer.
//!
//! An async transition lock orders start, stop and dispose. Start holds it
//! only while claiming `Starting`; stop and dispose hold it while a running
//! loop drains.

mod handlers;
mod receive_loop;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use self::handlers::{
    FnHandler, Handler, MessageHandler, TypedHandler, handler_fn, typed,
};

use self::handlers::HandlerRegistry;
use self::receive_loop::ReceiveLoop;
use crate::config::RtgsSdkOptions;
use crate::error::{SubscriberError, TransportError};
use crate::exception::ExceptionSink;
use crate::metrics::SubscriberMetrics;
use crate::signing::MessageVerifier;
use crate::transport::{GrpcConnector, HubConnector};

/// Observable subscriber state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SubscriberState {
    NotStarted,
    /// The stream is being opened.
    Starting,
    Running,
    Stopped,
    Disposed,
}

struct RunningLoop {
    id: u64,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

struct PendingStart {
    id: u64,
    cancel: CancellationToken,
    /// State to fall back to if the connect fails.
    from_stopped: bool,
}

enum Lifecycle {
    NotStarted,
    Starting(PendingStart),
    Running(RunningLoop),
    Stopped,
    Disposed,
}

impl Lifecycle {
    fn state(&self) -> SubscriberState {
        match self {
            Self::NotStarted => SubscriberState::NotStarted,
            Self::Starting(_) => SubscriberState::Starting,
            Self::Running(_) => SubscriberState::Running,
            Self::Stopped => SubscriberState::Stopped,
            Self::Disposed => SubscriberState::Disposed,
        }
    }
}

/// Subscriber for messages delivered by the hub.
pub struct RtgsSubscriber {
    connector: Arc<dyn HubConnector>,
    verifier: Option<Arc<dyn MessageVerifier>>,
    exceptions: ExceptionSink,
    transition: tokio::sync::Mutex<()>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    next_run: AtomicU64,
    metrics: SubscriberMetrics,
}

impl std::fmt::Debug for RtgsSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtgsSubscriber")
            .field("state", &self.state())
            .field("verified", &self.verifier.is_some())
            .field("exceptions", &self.exceptions)
            .finish_non_exhaustive()
    }
}

impl RtgsSubscriber {
    /// Create a subscriber that opens its stream through `connector`.
    pub fn new(connector: impl HubConnector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            verifier: None,
            exceptions: ExceptionSink::default(),
            transition: tokio::sync::Mutex::new(()),
            lifecycle: Arc::new(Mutex::new(Lifecycle::NotStarted)),
            next_run: AtomicU64::new(0),
            metrics: SubscriberMetrics::default(),
        }
    }

    /// Create a subscriber talking gRPC to the configured hub.
    pub fn connect(options: &RtgsSdkOptions) -> Result<Self, TransportError> {
        Ok(Self::new(GrpcConnector::new(options)?))
    }

    /// Verify every inbound frame with `verifier` before dispatch.
    pub fn with_verifier(mut self, verifier: impl MessageVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Where inbound failures are reported.
    pub fn exceptions(&self) -> &ExceptionSink {
        &self.exceptions
    }

    pub fn state(&self) -> SubscriberState {
        self.lifecycle.lock().state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SubscriberState::Running
    }

    /// Validate `handlers`, open the stream and start the receive loop.
    ///
    /// `handlers` must hold exactly one handler for every
    /// [`InboundKind`](crate::InboundKind). On a validation or transport
    /// error the subscriber stays in its previous state. A [`stop`] or
    /// [`dispose`] issued while the stream is opening abandons the start,
    /// which then fails with [`SubscriberError::StartCancelled`] or
    /// [`SubscriberError::Disposed`].
    ///
    /// [`stop`]: Self::stop
    /// [`dispose`]: Self::dispose
    pub async fn start(
        &self,
        handlers: Vec<Arc<dyn MessageHandler>>,
    ) -> Result<(), SubscriberError> {
        let (id, cancel, registry) = {
            let _transition = self.transition.lock().await;
            let mut lifecycle = self.lifecycle.lock();
            let from_stopped = match &*lifecycle {
                Lifecycle::Disposed => return Err(SubscriberError::Disposed),
                Lifecycle::Starting(_) | Lifecycle::Running(_) => {
                    return Err(SubscriberError::AlreadyRunning);
                }
                Lifecycle::NotStarted => false,
                Lifecycle::Stopped => true,
            };

            let registry = HandlerRegistry::build(&handlers)?;
            let id = self.next_run.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            *lifecycle = Lifecycle::Starting(PendingStart {
                id,
                cancel: cancel.clone(),
                from_stopped,
            });
            (id, cancel, registry)
        };

        // Falls back to the previous state unless the start completes or is
        // taken over by stop or dispose, including when this future is dropped.
        let _pending = RevertPendingStart {
            lifecycle: &self.lifecycle,
            id,
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.connector.open_subscriber_stream() => Some(opened),
        };
        let duplex = match opened {
            Some(opened) => opened?,
            None => {
                debug!(run = id, "Subscriber start cancelled while connecting");
                return Err(self.interrupted_start());
            }
        };
        self.metrics.inc_connections();

        let stop = CancellationToken::new();
        let receive_loop = ReceiveLoop {
            run_id: id,
            registry,
            verifier: self.verifier.clone(),
            exceptions: self.exceptions.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            stop: stop.clone(),
            metrics: self.metrics.clone(),
        };

        // Hold the state lock across the spawn so the loop cannot observe
        // the state before its own run is recorded.
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(&*lifecycle, Lifecycle::Starting(pending) if pending.id == id) {
            drop(lifecycle);
            drop(duplex);
            debug!(run = id, "Subscriber stopped before its stream was used");
            return Err(self.interrupted_start());
        }
        let task = tokio::spawn(receive_loop.run(duplex));
        *lifecycle = Lifecycle::Running(RunningLoop { id, stop, task });
        drop(lifecycle);
        debug!(run = id, "Subscriber started");
        Ok(())
    }

    fn interrupted_start(&self) -> SubscriberError {
        match &*self.lifecycle.lock() {
            Lifecycle::Disposed => SubscriberError::Disposed,
            _ => SubscriberError::StartCancelled,
        }
    }

    /// Stop the receive loop and wait for the message in hand to finish.
    ///
    /// A start still opening its stream is cancelled without waiting for
    /// the hub. Completes without error whether or not the subscriber was running,
    /// including after dispose.
    pub async fn stop(&self) {
        let _transition = self.transition.lock().await;
        let run = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(run) => run,
                Lifecycle::Starting(pending) => {
                    pending.cancel.cancel();
                    debug!(run = pending.id, "Subscriber stopped while starting");
                    return;
                }
                other => {
                    *lifecycle = other;
                    return;
                }
            }
        };
        shut_down(run).await;
        debug!("Subscriber stopped");
    }

    /// Stop the subscriber for good, cancelling any pending start. Later
    /// starts fail with [`SubscriberError::Disposed`].
    pub async fn dispose(&self) {
        let _transition = self.transition.lock().await;
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Disposed);
        match previous {
            Lifecycle::Disposed => return,
            Lifecycle::Running(run) => shut_down(run).await,
            Lifecycle::Starting(pending) => pending.cancel.cancel(),
            Lifecycle::NotStarted | Lifecycle::Stopped => {}
        }
        self.exceptions.clear();
        debug!("Subscriber disposed");
    }
}

async fn shut_down(run: RunningLoop) {
    run.stop.cancel();
    if let Err(error) = run.task.await {
        debug!(run = run.id, %error, "Receive loop did not exit cleanly");
    }
}

/// Restores `NotStarted` or `Stopped` if start `id` is still pending when
/// dropped.
struct RevertPendingStart<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    id: u64,
}

impl Drop for RevertPendingStart<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.lifecycle.lock();
        let from_stopped = match &*lifecycle {
            Lifecycle::Starting(pending) if pending.id == self.id => pending.from_stopped,
            _ => return,
        };
        *lifecycle = if from_stopped {
            Lifecycle::Stopped
        } else {
            Lifecycle::NotStarted
        };
        debug!(run = self.id, "Subscriber start did not complete");
    }
}

impl Drop for RtgsSubscriber {
    fn drop(&mut self) {
        match &*self.lifecycle.lock() {
            Lifecycle::Starting(pending) => pending.cancel.cancel(),
            Lifecycle::Running(run) => run.stop.cancel(),
            _ => {}
        }
    }
}
