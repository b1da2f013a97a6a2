//! Send a message and wait for its acknowledgement.
//!
//! [`RtgsPublisher`] keeps exactly one exchange in flight. Each send:
//!
//! 1. waits for the publisher gate, observing the caller's cancellation;
//! 2. opens a stream if there is no live one;
//! 3. registers the new correlation id, then writes the frame;
//! 4. waits for the matching acknowledgement, a stream failure, cancellation,
//!    disposal, or the configured timeout, whichever comes first.
//!
//! The gate is a `tokio::sync::Mutex` that also owns the connection, so the
//! write side is only ever touched by the gate holder and the gate is released
//! on every exit path when the guard drops.

mod connection;
mod correlation;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use self::connection::PublisherConnection;
use self::correlation::{CorrelationSlot, Resolution};
use crate::config::RtgsSdkOptions;
use crate::error::{PublisherError, TransportError};
use crate::frame::{Acknowledgement, Frame, Headers};
use crate::messages::{OutboundKind, OutboundMessage};
use crate::metrics::PublisherMetrics;
use crate::signing::MessageSigner;
use crate::transport::{GrpcConnector, HubConnector};

/// Outcome of a send that reached the hub or timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SendStatus {
    /// The hub accepted the message.
    Success,
    /// The hub acknowledged the message with a failure.
    Rejected,
    /// No matching acknowledgement arrived in time.
    Timeout,
}

/// Result of [`RtgsPublisher::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub status: SendStatus,
    /// Correlation id written on the frame.
    pub correlation_id: String,
    /// The matching acknowledgement. `None` on timeout.
    pub acknowledgement: Option<Acknowledgement>,
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }
}

/// Why a wait ended without a resolution from the reader.
enum Interrupted {
    Cancelled,
    Disposed,
    Terminated,
    TimedOut,
}

struct PublisherInner {
    connector: Arc<dyn HubConnector>,
    signer: Option<Arc<dyn MessageSigner>>,
    wait_for_acknowledgement: Duration,
    gate: Mutex<Option<PublisherConnection>>,
    slot: Arc<CorrelationSlot>,
    disposed: CancellationToken,
    metrics: PublisherMetrics,
}

/// Publisher handle. Clones share the gate and the connection.
#[derive(Clone)]
pub struct RtgsPublisher {
    inner: Arc<PublisherInner>,
}

impl std::fmt::Debug for RtgsPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtgsPublisher")
            .field("wait_for_acknowledgement", &self.inner.wait_for_acknowledgement)
            .field("signed", &self.inner.signer.is_some())
            .field("disposed", &self.inner.disposed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RtgsPublisher {
    /// Create a publisher that opens its streams through `connector`.
    ///
    /// No stream is opened until the first send.
    pub fn new(connector: impl HubConnector + 'static, options: &RtgsSdkOptions) -> Self {
        Self::with_parts(Arc::new(connector), None, options)
    }

    /// Like [`new`](Self::new), signing every outbound frame with `signer`
    /// before it is written.
    pub fn signed(
        connector: impl HubConnector + 'static,
        signer: impl MessageSigner + 'static,
        options: &RtgsSdkOptions,
    ) -> Self {
        Self::with_parts(Arc::new(connector), Some(Arc::new(signer)), options)
    }

    /// Create a publisher talking gRPC to the configured hub.
    pub fn connect(options: &RtgsSdkOptions) -> Result<Self, TransportError> {
        Ok(Self::new(GrpcConnector::new(options)?, options))
    }

    /// Create a signing publisher talking gRPC to the configured hub.
    pub fn connect_signed(
        signer: impl MessageSigner + 'static,
        options: &RtgsSdkOptions,
    ) -> Result<Self, TransportError> {
        Ok(Self::signed(GrpcConnector::new(options)?, signer, options))
    }

    fn with_parts(
        connector: Arc<dyn HubConnector>,
        signer: Option<Arc<dyn MessageSigner>>,
        options: &RtgsSdkOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                connector,
                signer,
                wait_for_acknowledgement: options.wait_for_acknowledgement_duration(),
                gate: Mutex::new(None),
                slot: Arc::new(CorrelationSlot::default()),
                disposed: CancellationToken::new(),
                metrics: PublisherMetrics::default(),
            }),
        }
    }

    /// Send `message` and wait for the hub to acknowledge it.
    pub async fn send<M: OutboundMessage>(
        &self,
        message: &M,
        cancel: &CancellationToken,
    ) -> Result<SendResult, PublisherError> {
        self.send_with_headers(message, Headers::new(), cancel).await
    }

    /// Like [`send`](Self::send), with extra headers on the frame.
    pub async fn send_with_headers<M: OutboundMessage>(
        &self,
        message: &M,
        headers: Headers,
        cancel: &CancellationToken,
    ) -> Result<SendResult, PublisherError> {
        let inner = &*self.inner;
        let payload = message.to_payload()?;
        let frame = Frame {
            message_identifier: M::KIND.identifier().to_owned(),
            correlation_id: Uuid::new_v4().to_string(),
            payload,
            headers,
        };

        let mut gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                inner.metrics.inc_cancelled();
                return Err(PublisherError::Cancelled);
            }
            _ = inner.disposed.cancelled() => return Err(PublisherError::Disposed),
            gate = inner.gate.lock() => gate,
        };

        let result = inner.send_locked(&mut gate, M::KIND, frame, cancel).await;
        if let Err(PublisherError::Transport(error)) = &result {
            debug!(%error, "Dropping failed publisher stream");
            if let Some(connection) = gate.take() {
                connection.close().await;
            }
        }
        result
    }

    /// Close the stream and fail every current and future send with
    /// [`PublisherError::Disposed`]. Idempotent.
    pub async fn dispose(&self) {
        let inner = &*self.inner;
        inner.disposed.cancel();
        let _ = inner.slot.fail(Resolution::Disposed);

        let connection = inner.gate.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await;
            debug!("Publisher disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.is_cancelled()
    }
}

impl PublisherInner {
    async fn send_locked(
        &self,
        connection: &mut Option<PublisherConnection>,
        kind: OutboundKind,
        mut frame: Frame,
        cancel: &CancellationToken,
    ) -> Result<SendResult, PublisherError> {
        if self.disposed.is_cancelled() {
            return Err(PublisherError::Disposed);
        }
        self.metrics.inc_sends();

        if let Some(signer) = &self.signer {
            signer
                .sign(&mut frame)
                .await
                .map_err(PublisherError::Signing)?;
        }

        let connection = match connection.take() {
            Some(live) if live.is_alive() => connection.insert(live),
            stale => {
                if let Some(dead) = stale {
                    dead.close().await;
                }
                let opened = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.cancelled()),
                    _ = self.disposed.cancelled() => return Err(PublisherError::Disposed),
                    opened = PublisherConnection::open(
                        self.connector.as_ref(),
                        self.slot.clone(),
                        self.metrics.clone(),
                    ) => opened?,
                };
                connection.insert(opened)
            }
        };

        let correlation_id = frame.correlation_id.clone();
        let mut pending = self.slot.register(correlation_id.clone());

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled()),
            _ = self.disposed.cancelled() => Err(PublisherError::Disposed),
            written = connection.write(frame) => written.map_err(PublisherError::from),
        };
        if let Err(error) = written {
            self.slot.clear(&correlation_id);
            return Err(error);
        }

        let resolution = tokio::select! {
            biased;
            resolution = &mut pending => Ok(resolution),
            _ = cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = self.disposed.cancelled() => Err(Interrupted::Disposed),
            _ = connection.terminated() => Err(Interrupted::Terminated),
            _ = tokio::time::sleep(self.wait_for_acknowledgement) => Err(Interrupted::TimedOut),
        };

        let resolution = match resolution {
            Ok(resolution) => resolution,
            Err(interrupted) => {
                if self.slot.clear(&correlation_id) {
                    return match interrupted {
                        Interrupted::Cancelled => Err(self.cancelled()),
                        Interrupted::Disposed => Err(PublisherError::Disposed),
                        Interrupted::Terminated => {
                            Err(PublisherError::Transport(TransportError::Closed))
                        }
                        Interrupted::TimedOut => Ok(self.timed_out(kind, correlation_id)),
                    };
                }
                // The reader resolved the entry while we were giving up on it.
                pending.await
            }
        };

        match resolution {
            Ok(Resolution::Acknowledged(ack)) => {
                let status = if ack.success {
                    self.metrics.inc_acknowledged();
                    SendStatus::Success
                } else {
                    self.metrics.inc_rejected();
                    SendStatus::Rejected
                };
                debug!(%kind, %correlation_id, %status, "Received acknowledgement");
                Ok(SendResult {
                    status,
                    correlation_id,
                    acknowledgement: Some(ack),
                })
            }
            Ok(Resolution::Failed(error)) => Err(error.into()),
            Ok(Resolution::Disposed) => Err(PublisherError::Disposed),
            Err(_) => Err(TransportError::Closed.into()),
        }
    }

    fn cancelled(&self) -> PublisherError {
        self.metrics.inc_cancelled();
        PublisherError::Cancelled
    }

    fn timed_out(&self, kind: OutboundKind, correlation_id: String) -> SendResult {
        self.metrics.inc_timeouts();
        error!(
            %kind,
            %correlation_id,
            timeout = ?self.wait_for_acknowledgement,
            "Timed out waiting for {kind} acknowledgement"
        );
        SendResult {
            status: SendStatus::Timeout,
            correlation_id,
            acknowledgement: None,
        }
    }
}
