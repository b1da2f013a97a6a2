//! Wire types for the RTGS hub messaging calls.
//!
//! The hub exposes a single gRPC service, `rtgs.global.v1.Payment`, with two
//! bidirectional streaming calls:
//!
//! - `ToRtgsMessage`: the client streams [`RtgsMessage`]s and the hub streams
//!   back one [`RtgsMessageAcknowledgement`] per message.
//! - `FromRtgsMessage`: the hub streams [`RtgsMessage`]s and the client streams
//!   back one [`RtgsMessageAcknowledgement`] per message.
//!
//! The messages are declared directly with `prost` derives so the crate needs
//! no build script or `protoc`. Field tags must stay stable.

/// Fully-qualified gRPC method paths.
pub mod paths {
    /// Client-to-hub message stream.
    pub const TO_RTGS_MESSAGE: &str = "/rtgs.global.v1.Payment/ToRtgsMessage";

    /// Hub-to-client message stream.
    pub const FROM_RTGS_MESSAGE: &str = "/rtgs.global.v1.Payment/FromRtgsMessage";
}

/// One routing header. Headers are repeated, so their order survives the wire.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Header {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

impl Header {
    /// Create a header from a key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A message envelope travelling in either direction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtgsMessage {
    /// Unique per client-initiated exchange.
    #[prost(string, tag = "1")]
    pub correlation_id: String,
    /// Serialized message body.
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    /// Identifies the kind of message carried in `data`.
    #[prost(string, tag = "3")]
    pub message_identifier: String,
    #[prost(message, repeated, tag = "4")]
    pub headers: Vec<Header>,
}

/// Acknowledgement of a single [`RtgsMessage`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtgsMessageAcknowledgement {
    /// Correlation id of the acknowledged message.
    #[prost(string, tag = "1")]
    pub correlation_id: String,
    #[prost(bool, tag = "2")]
    pub success: bool,
    /// Human readable reason, usually only set on failure.
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(message, repeated, tag = "4")]
    pub headers: Vec<Header>,
}
