//! Message catalogue.
//!
//! The set of message kinds is closed and fixed at build time. Each kind maps
//! to one identifier string carried in [`Frame::message_identifier`](crate::Frame)
//! and to one payload type.
//!
//! - [`OutboundKind`]: messages a [`RtgsPublisher`](crate::RtgsPublisher) sends.
//! - [`InboundKind`]: messages a [`RtgsSubscriber`](crate::RtgsSubscriber)
//!   receives; every one of them needs exactly one handler.
//!
//! Payloads are JSON by default. A message type can override
//! [`OutboundMessage::to_payload`] or [`InboundMessage::from_payload`] to use
//! a different encoding.

mod inbound;
mod outbound;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub use inbound::*;
pub use outbound::*;

/// Payload (de)serialization failure.
#[derive(Debug, thiserror::Error)]
#[error("invalid message payload: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Kinds the publisher can send.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum OutboundKind {
    AtomicLockRequestV1,
    AtomicTransferRequestV1,
    EarmarkConfirmationV1,
    AtomicTransferConfirmationV1,
    UpdateLedgerRequestV1,
    PayawayCreationV1,
    PayawayConfirmationV1,
    PayawayRejectionV1,
    BankPartnersRequestV1,
}

impl OutboundKind {
    /// The identifier written to the frame.
    pub fn identifier(self) -> &'static str {
        self.into()
    }
}

/// Kinds the subscriber can receive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum InboundKind {
    AtomicLockResponseV1,
    AtomicTransferResponseV1,
    AtomicTransferFundsV1,
    MessageRejectV1,
    PayawayFundsV1,
    PayawayCompleteV1,
    EarmarkFundsV1,
    EarmarkCompleteV1,
    EarmarkReleaseV1,
    BankPartnersResponseV1,
}

impl InboundKind {
    /// The identifier expected on the frame.
    pub fn identifier(self) -> &'static str {
        self.into()
    }

    /// Resolve a frame identifier. Unknown identifiers yield `None`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        identifier.parse().ok()
    }
}

/// A message the publisher can send.
pub trait OutboundMessage: Serialize + Send + Sync {
    const KIND: OutboundKind;

    /// Serialize into frame payload bytes.
    fn to_payload(&self) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// A message the subscriber can receive.
pub trait InboundMessage: DeserializeOwned + Send + 'static {
    const KIND: InboundKind;

    /// Deserialize from frame payload bytes.
    fn from_payload(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

macro_rules! outbound_messages {
    ($($ty:ident),* $(,)?) => {
        $(
            impl OutboundMessage for $ty {
                const KIND: OutboundKind = OutboundKind::$ty;
            }
        )*
    };
}

macro_rules! inbound_messages {
    ($($ty:ident),* $(,)?) => {
        $(
            impl InboundMessage for $ty {
                const KIND: InboundKind = InboundKind::$ty;
            }
        )*
    };
}

outbound_messages!(
    AtomicLockRequestV1,
    AtomicTransferRequestV1,
    EarmarkConfirmationV1,
    AtomicTransferConfirmationV1,
    UpdateLedgerRequestV1,
    PayawayCreationV1,
    PayawayConfirmationV1,
    PayawayRejectionV1,
    BankPartnersRequestV1,
);

inbound_messages!(
    AtomicLockResponseV1,
    AtomicTransferResponseV1,
    AtomicTransferFundsV1,
    MessageRejectV1,
    PayawayFundsV1,
    PayawayCompleteV1,
    EarmarkFundsV1,
    EarmarkCompleteV1,
    EarmarkReleaseV1,
    BankPartnersResponseV1,
);
