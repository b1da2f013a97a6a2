//! The per-run receive loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::Lifecycle;
use super::handlers::HandlerRegistry;
use crate::error::{HandlerError, InboundError, TransportError};
use crate::exception::ExceptionSink;
use crate::frame::{Acknowledgement, Frame};
use crate::metrics::SubscriberMetrics;
use crate::signing::MessageVerifier;
use crate::transport::Duplex;

/// Everything one run needs. Dropped when the run ends.
pub(super) struct ReceiveLoop {
    pub(super) run_id: u64,
    pub(super) registry: HandlerRegistry,
    pub(super) verifier: Option<Arc<dyn MessageVerifier>>,
    pub(super) exceptions: ExceptionSink,
    pub(super) lifecycle: Arc<Mutex<Lifecycle>>,
    pub(super) stop: CancellationToken,
    pub(super) metrics: SubscriberMetrics,
}

impl ReceiveLoop {
    /// Process frames until stopped or until the stream fails.
    ///
    /// Stop is only observed between frames, so a message already being
    /// handled always runs to completion.
    pub(super) async fn run(self, duplex: Duplex<Acknowledgement, Frame>) {
        let Duplex {
            outbound,
            mut inbound,
        } = duplex;

        let failure = loop {
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    debug!(run = self.run_id, "Receive loop stopped");
                    return;
                }
                next = inbound.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(error)) => break error,
                None => break TransportError::Closed,
            };
            self.metrics.inc_received();

            if let Err(error) = self.process(frame, &outbound).await {
                break error;
            }
        };

        drop(outbound);
        self.terminate(failure);
    }

    /// Acknowledge and dispatch one frame. Only a failed acknowledgement
    /// write is returned; every other failure is reported and swallowed.
    async fn process(
        &self,
        frame: Frame,
        outbound: &mpsc::Sender<Acknowledgement>,
    ) -> Result<(), TransportError> {
        let correlation_id = frame.correlation_id.clone();

        if frame.message_identifier.is_empty() {
            let error = InboundError::MissingIdentifier {
                correlation_id: correlation_id.clone(),
            };
            return self.reject(outbound, correlation_id, error).await;
        }

        let Some(handler) = self.registry.resolve(&frame.message_identifier) else {
            let error = InboundError::NoHandler {
                identifier: frame.message_identifier,
                correlation_id: correlation_id.clone(),
            };
            return self.reject(outbound, correlation_id, error).await;
        };

        if let Some(verifier) = &self.verifier
            && let Err(report) = verifier.verify(&frame).await
        {
            let error = InboundError::Verification {
                identifier: frame.message_identifier,
                report,
            };
            return self.reject(outbound, correlation_id, error).await;
        }

        send_ack(outbound, Acknowledgement::success(correlation_id)).await?;

        let kind = handler.kind();
        let dispatched = AssertUnwindSafe(handler.dispatch(&frame.payload))
            .catch_unwind()
            .await;
        match dispatched {
            Ok(Ok(())) => self.metrics.inc_handled(),
            Ok(Err(error)) => self.report(InboundError::Handler { kind, error }),
            Err(_) => self.report(InboundError::Handler {
                kind,
                error: HandlerError::Panicked,
            }),
        }
        Ok(())
    }

    async fn reject(
        &self,
        outbound: &mpsc::Sender<Acknowledgement>,
        correlation_id: String,
        error: InboundError,
    ) -> Result<(), TransportError> {
        let ack = Acknowledgement::failure(correlation_id, error.to_string());
        send_ack(outbound, ack).await?;
        self.report(error);
        Ok(())
    }

    /// Report a non-fatal error. The loop keeps running.
    fn report(&self, error: InboundError) {
        self.metrics.inc_failed();
        warn!(run = self.run_id, %error, "Inbound message failed");
        self.exceptions.notify(error, false);
    }

    /// Handle the end of the stream.
    ///
    /// The end is fatal only if this run is still the current one and no
    /// stop was requested: a stop swaps the lifecycle out before it cancels
    /// the loop, so losing that race makes the end graceful.
    fn terminate(self, failure: TransportError) {
        let fatal = {
            let mut lifecycle = self.lifecycle.lock();
            let current =
                matches!(&*lifecycle, Lifecycle::Running(run) if run.id == self.run_id);
            if current && !self.stop.is_cancelled() {
                *lifecycle = Lifecycle::Stopped;
                true
            } else {
                false
            }
        };

        if !fatal {
            debug!(
                run = self.run_id,
                error = %failure,
                "Receive loop ended during stop"
            );
            return;
        }

        self.metrics.inc_fatal_stops();
        error!(
            run = self.run_id,
            error = %failure,
            "Subscriber stream terminated unexpectedly"
        );
        self.exceptions
            .notify(InboundError::StreamTerminated(failure), true);
    }
}

async fn send_ack(
    outbound: &mpsc::Sender<Acknowledgement>,
    ack: Acknowledgement,
) -> Result<(), TransportError> {
    outbound.send(ack).await.map_err(|_| TransportError::Closed)
}
