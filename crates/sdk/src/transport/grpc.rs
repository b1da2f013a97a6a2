//! tonic-backed [`HubConnector`].

use async_trait::async_trait;
use futures::StreamExt;
use http::uri::PathAndQuery;
use rtgs_proto::{RtgsMessage, RtgsMessageAcknowledgement, paths};
use tokio::sync::{OnceCell, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::ProstCodec;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::debug;

use super::{Duplex, HubConnector, LEGACY_BANK_DID_HEADER, RTGS_GLOBAL_ID_HEADER};
use crate::config::RtgsSdkOptions;
use crate::error::TransportError;
use crate::frame::{Acknowledgement, Frame};

/// Opens the hub's streaming calls over a shared HTTP/2 channel.
///
/// The channel is created on first use and reconnects on its own; every
/// opened stream carries the institution header and the configured
/// keep-alive settings.
pub struct GrpcConnector {
    endpoint: Endpoint,
    channel: OnceCell<Channel>,
    institution_header: &'static str,
    rtgs_global_id: MetadataValue<Ascii>,
    outbound_buffer: usize,
}

impl GrpcConnector {
    /// Create a connector from validated options. No connection is made yet.
    pub fn new(options: &RtgsSdkOptions) -> Result<Self, TransportError> {
        let mut endpoint = Endpoint::from_shared(options.remote_host_address().to_owned())?
            .connect_timeout(options.connect_timeout())
            .http2_keep_alive_interval(options.keep_alive_ping_delay())
            .keep_alive_timeout(options.keep_alive_ping_timeout())
            .keep_alive_while_idle(true);
        if endpoint.uri().scheme_str() == Some("https") {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }

        let rtgs_global_id = MetadataValue::try_from(options.rtgs_global_id())
            .map_err(|_| TransportError::InvalidHeader(options.rtgs_global_id().to_owned()))?;
        let institution_header = if options.use_legacy_bank_did_header() {
            LEGACY_BANK_DID_HEADER
        } else {
            RTGS_GLOBAL_ID_HEADER
        };

        Ok(Self {
            endpoint,
            channel: OnceCell::new(),
            institution_header,
            rtgs_global_id,
            outbound_buffer: options.outbound_buffer(),
        })
    }

    async fn channel(&self) -> Channel {
        self.channel
            .get_or_init(|| async { self.endpoint.connect_lazy() })
            .await
            .clone()
    }

    async fn open<Out, In, WireOut, WireIn>(
        &self,
        path: &'static str,
    ) -> Result<Duplex<Out, In>, TransportError>
    where
        Out: Into<WireOut> + Send + 'static,
        In: From<WireIn> + Send + 'static,
        WireOut: prost::Message + Send + 'static,
        WireIn: prost::Message + Default + Send + 'static,
    {
        let (outbound, rx) = mpsc::channel::<Out>(self.outbound_buffer);
        let requests = ReceiverStream::new(rx).map(|item: Out| -> WireOut { item.into() });

        let mut request = tonic::Request::new(requests);
        request
            .metadata_mut()
            .insert(self.institution_header, self.rtgs_global_id.clone());

        let mut grpc = tonic::client::Grpc::new(self.channel().await);
        grpc.ready()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let response = grpc
            .streaming(
                request,
                PathAndQuery::from_static(path),
                ProstCodec::<WireOut, WireIn>::default(),
            )
            .await?;
        debug!(path, "Opened hub stream");

        let inbound = response
            .into_inner()
            .map(|item| item.map(In::from).map_err(TransportError::from))
            .boxed();

        Ok(Duplex { outbound, inbound })
    }
}

impl std::fmt::Debug for GrpcConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcConnector")
            .field("uri", self.endpoint.uri())
            .field("institution_header", &self.institution_header)
            .field("connected", &self.channel.initialized())
            .finish()
    }
}

#[async_trait]
impl HubConnector for GrpcConnector {
    async fn open_publisher_stream(&self) -> Result<Duplex<Frame, Acknowledgement>, TransportError> {
        self.open::<Frame, Acknowledgement, RtgsMessage, RtgsMessageAcknowledgement>(
            paths::TO_RTGS_MESSAGE,
        )
        .await
    }

    async fn open_subscriber_stream(&self) -> Result<Duplex<Acknowledgement, Frame>, TransportError> {
        self.open::<Acknowledgement, Frame, RtgsMessageAcknowledgement, RtgsMessage>(
            paths::FROM_RTGS_MESSAGE,
        )
        .await
    }
}
