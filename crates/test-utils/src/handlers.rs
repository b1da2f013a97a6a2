//! Handler sets for driving a subscriber in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rtgs_sdk::{Frame, HandlerError, InboundKind, MessageHandler};
use tokio::sync::Notify;

/// What a recording handler does after recording the payload.
#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    Fail(String),
    Panic,
    /// Wait until the gate is opened.
    Block(Arc<Notify>),
}

/// Handler that records every payload it is given.
#[derive(Debug)]
pub struct RecordingHandler {
    kind: InboundKind,
    behaviour: Behaviour,
    log: Arc<Mutex<Vec<(InboundKind, Bytes)>>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    fn kind(&self) -> InboundKind {
        self.kind
    }

    async fn dispatch(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.log
            .lock()
            .push((self.kind, Bytes::copy_from_slice(payload)));
        self.notify.notify_waiters();

        match &self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail(reason) => Err(HandlerError::Failed(eyre::eyre!(reason.clone()))),
            Behaviour::Panic => panic!("{} handler panicked", self.kind),
            Behaviour::Block(gate) => {
                gate.notified().await;
                Ok(())
            }
        }
    }
}

/// A full handler set, one [`RecordingHandler`] per inbound kind, sharing a
/// single log.
///
/// Individual kinds can be told to fail, panic or block before the set is
/// handed to the subscriber.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    log: Arc<Mutex<Vec<(InboundKind, Bytes)>>>,
    notify: Arc<Notify>,
    behaviours: Vec<(InboundKind, Behaviour)>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the handler for `kind` return an error.
    pub fn failing(mut self, kind: InboundKind, reason: impl Into<String>) -> Self {
        self.behaviours.push((kind, Behaviour::Fail(reason.into())));
        self
    }

    /// Make the handler for `kind` panic.
    pub fn panicking(mut self, kind: InboundKind) -> Self {
        self.behaviours.push((kind, Behaviour::Panic));
        self
    }

    /// Make the handler for `kind` wait until the returned gate is notified
    /// with `notify_one`.
    pub fn blocking(mut self, kind: InboundKind) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.behaviours.push((kind, Behaviour::Block(gate.clone())));
        (self, gate)
    }

    /// One handler per inbound kind.
    pub fn handlers(&self) -> Vec<Arc<dyn MessageHandler>> {
        use strum::IntoEnumIterator;

        InboundKind::iter()
            .map(|kind| self.handler(kind))
            .collect()
    }

    /// A single recording handler for `kind`, sharing this set's log.
    pub fn handler(&self, kind: InboundKind) -> Arc<dyn MessageHandler> {
        let behaviour = self
            .behaviours
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, behaviour)| behaviour.clone())
            .unwrap_or(Behaviour::Succeed);
        Arc::new(RecordingHandler {
            kind,
            behaviour,
            log: self.log.clone(),
            notify: self.notify.clone(),
        })
    }

    /// Kinds dispatched so far, in dispatch order.
    pub fn received(&self) -> Vec<InboundKind> {
        self.log.lock().iter().map(|(kind, _)| *kind).collect()
    }

    /// Payloads dispatched so far, in dispatch order.
    pub fn payloads(&self) -> Vec<Bytes> {
        self.log.lock().iter().map(|(_, payload)| payload.clone()).collect()
    }

    /// Wait until at least `count` messages have been dispatched.
    ///
    /// Returns `false` after [`RECV_TIMEOUT`](crate::RECV_TIMEOUT).
    pub async fn wait_for(&self, count: usize) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.log.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(crate::RECV_TIMEOUT, wait).await.is_ok()
    }
}

/// A frame for `kind` carrying `payload` as JSON.
pub fn inbound_frame(
    kind: InboundKind,
    correlation_id: impl Into<String>,
    payload: &serde_json::Value,
) -> Frame {
    let payload = serde_json::to_vec(payload).unwrap_or_default();
    Frame::new(kind.identifier(), correlation_id, payload)
}

/// Let spawned tasks run without advancing a paused clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
