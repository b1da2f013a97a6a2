//! One publisher stream and its acknowledgement reader.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

use super::correlation::{CorrelationSlot, Resolution};
use crate::error::TransportError;
use crate::frame::{Acknowledgement, Frame};
use crate::metrics::PublisherMetrics;
use crate::transport::{Duplex, HubConnector, InboundStream};

/// Write side of a publisher stream plus the task that owns its read side.
///
/// The reader lives exactly as long as the connection. It stops when the
/// stream ends, when the connection is closed, or when the connection is
/// dropped.
#[derive(Debug)]
pub(crate) struct PublisherConnection {
    outbound: mpsc::Sender<Frame>,
    terminated: CancellationToken,
    shutdown: DropGuard,
    reader: JoinHandle<()>,
}

impl PublisherConnection {
    pub(crate) async fn open<C>(
        connector: &C,
        slot: Arc<CorrelationSlot>,
        metrics: PublisherMetrics,
    ) -> Result<Self, TransportError>
    where
        C: HubConnector + ?Sized,
    {
        let Duplex { outbound, inbound } = connector.open_publisher_stream().await?;
        metrics.inc_connections();
        debug!("Publisher stream opened");

        let terminated = CancellationToken::new();
        let shutdown = CancellationToken::new();
        let reader = tokio::spawn(read_acknowledgements(
            inbound,
            slot,
            terminated.clone(),
            shutdown.clone(),
            metrics,
        ));

        Ok(Self {
            outbound,
            terminated,
            shutdown: shutdown.drop_guard(),
            reader,
        })
    }

    /// `false` once the read side has ended or the write side is closed.
    pub(crate) fn is_alive(&self) -> bool {
        !self.terminated.is_cancelled() && !self.outbound.is_closed()
    }

    /// Resolves once the read side has ended.
    pub(crate) async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    pub(crate) async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Half-close the stream and wait for the reader to exit.
    pub(crate) async fn close(self) {
        let Self {
            outbound,
            shutdown,
            reader,
            ..
        } = self;
        drop(shutdown);
        drop(outbound);
        let _ = reader.await;
    }
}

async fn read_acknowledgements(
    mut inbound: InboundStream<Acknowledgement>,
    slot: Arc<CorrelationSlot>,
    terminated: CancellationToken,
    shutdown: CancellationToken,
    metrics: PublisherMetrics,
) {
    let failure = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(ack)) => {
                if let Err(ack) = slot.acknowledge(ack) {
                    metrics.inc_unexpected_acknowledgements();
                    debug!(
                        correlation_id = %ack.correlation_id,
                        success = ack.success,
                        "Discarding unexpected acknowledgement"
                    );
                }
            }
            Some(Err(error)) => break error,
            None => break TransportError::Closed,
        }
    };

    // Fail the live send before flagging the connection dead, so a sender
    // that observes the flag and finds its entry gone knows a resolution is
    // waiting.
    if let Err(Resolution::Failed(error)) = slot.fail(Resolution::Failed(failure)) {
        error!(%error, "Publisher stream failed with no send in flight");
    }
    terminated.cancel();
}
