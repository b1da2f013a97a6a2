//! Transport seam between the engine and the hub.
//!
//! The publisher and subscriber never talk to tonic directly. They ask a
//! [`HubConnector`] for a [`Duplex`]: one bidirectional call split into a
//! write side (an `mpsc` sender) and a read side (a boxed stream). The
//! production connector is [`GrpcConnector`]; tests plug in an in-memory hub.
//!
//! A `Duplex` is one connection. When its read side ends or errors the
//! connection is dead and the owner opens a new one.

mod grpc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::frame::{Acknowledgement, Frame};

pub use grpc::GrpcConnector;

/// Header carrying the institution identifier.
pub const RTGS_GLOBAL_ID_HEADER: &str = "rtgs-global-id";

/// Legacy spelling of [`RTGS_GLOBAL_ID_HEADER`].
pub const LEGACY_BANK_DID_HEADER: &str = "bankdid";

/// Read side of a connection.
pub type InboundStream<T> = BoxStream<'static, Result<T, TransportError>>;

/// One bidirectional streaming call.
pub struct Duplex<Out, In> {
    /// Write side. Dropping it half-closes the call.
    pub outbound: mpsc::Sender<Out>,
    /// Read side. Ends when the hub completes the call.
    pub inbound: InboundStream<In>,
}

impl<Out, In> std::fmt::Debug for Duplex<Out, In> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplex")
            .field("outbound_closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

/// Opens the two message streams to the hub.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait HubConnector: Send + Sync {
    /// Open the stream the publisher writes frames to and reads
    /// acknowledgements from.
    async fn open_publisher_stream(&self) -> Result<Duplex<Frame, Acknowledgement>, TransportError>;

    /// Open the stream the subscriber reads frames from and writes
    /// acknowledgements to.
    async fn open_subscriber_stream(&self) -> Result<Duplex<Acknowledgement, Frame>, TransportError>;
}
