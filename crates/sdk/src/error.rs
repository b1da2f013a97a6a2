//! Error types for the publisher and subscriber.
//!
//! Callers see these as typed results for the operations they invoke
//! directly. Failures the caller did not directly cause (a handler failing,
//! the hub closing the subscriber stream) are carried as [`InboundError`]
//! through the [`ExceptionSink`](crate::ExceptionSink) instead.

use crate::messages::{CodecError, InboundKind};

/// Failure of the underlying streaming call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The hub endpoint could not be configured.
    #[error("invalid hub endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),

    /// The hub could not be reached.
    #[error("hub unavailable: {0}")]
    Unavailable(String),

    /// The institution identifier is not a valid header value.
    #[error("invalid institution header value: {0}")]
    InvalidHeader(String),

    /// The call failed with a gRPC status.
    #[error("rpc failed: {0}")]
    Status(#[from] tonic::Status),

    /// The stream completed while the SDK still expected traffic.
    #[error("stream closed by hub")]
    Closed,
}

/// Error returned by [`RtgsPublisher::send`](crate::RtgsPublisher::send).
///
/// A rejected or timed-out send is not an error; see
/// [`SendStatus`](crate::SendStatus).
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    /// The caller's cancellation token fired.
    #[error("send cancelled")]
    Cancelled,

    /// The publisher was disposed.
    #[error("publisher has been disposed")]
    Disposed,

    /// The message could not be serialized.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The signing collaborator refused the message.
    #[error("failed to sign message: {0}")]
    Signing(eyre::Report),

    /// The stream failed while the send was in flight.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Handler set rejected at subscriber start.
///
/// Every problem with the set is reported at once: all duplicated kinds and
/// all missing kinds, each list in catalogue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe_invalid_set(.duplicate, .missing))]
pub struct HandlerValidationError {
    /// Kinds with more than one handler.
    pub duplicate: Vec<InboundKind>,
    /// Kinds with no handler.
    pub missing: Vec<InboundKind>,
}

impl HandlerValidationError {
    /// `true` when the set has neither duplicates nor gaps.
    pub fn is_empty(&self) -> bool {
        self.duplicate.is_empty() && self.missing.is_empty()
    }
}

fn describe_invalid_set(duplicate: &[InboundKind], missing: &[InboundKind]) -> String {
    let mut problems = Vec::with_capacity(2);
    if !duplicate.is_empty() {
        problems.push(format!(
            "multiple handlers supplied for messages: {}",
            join_kinds(duplicate)
        ));
    }
    if !missing.is_empty() {
        problems.push(format!(
            "no handler supplied for messages: {}",
            join_kinds(missing)
        ));
    }
    problems.join("; ")
}

fn join_kinds(kinds: &[InboundKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.identifier())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error returned by subscriber lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("subscriber is already running")]
    AlreadyRunning,

    #[error("subscriber has been disposed")]
    Disposed,

    /// A stop arrived while the stream was still opening.
    #[error("subscriber start was cancelled by stop")]
    StartCancelled,

    #[error(transparent)]
    InvalidHandlers(#[from] HandlerValidationError),

    /// The subscriber stream could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure inside a [`MessageHandler`](crate::MessageHandler) dispatch.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload did not decode into the handler's message type.
    #[error(transparent)]
    Decode(#[from] CodecError),

    /// The handler returned an error.
    #[error("{0}")]
    Failed(eyre::Report),

    /// The handler panicked.
    #[error("handler panicked")]
    Panicked,
}

/// An error surfaced through the exception sink.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    /// A frame arrived without a message identifier.
    #[error("Message with no identifier received")]
    MissingIdentifier {
        correlation_id: String,
    },

    /// No handler is registered for the frame's identifier.
    #[error("No handler found for message {identifier}")]
    NoHandler {
        identifier: String,
        correlation_id: String,
    },

    /// The verification collaborator rejected the frame.
    #[error("Verification of {identifier} message failed: {report}")]
    Verification {
        identifier: String,
        report: eyre::Report,
    },

    /// The handler for an accepted message failed.
    #[error("Handler for {kind} message failed: {error}")]
    Handler {
        kind: InboundKind,
        #[source]
        error: HandlerError,
    },

    /// The subscriber stream ended without a stop being requested.
    #[error("Subscriber stream terminated unexpectedly: {0}")]
    StreamTerminated(#[source] TransportError),
}
