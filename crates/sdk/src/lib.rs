//! Client for exchanging payment messages with an RTGS hub.
//!
//! Two roles share one correlation and lifecycle engine:
//!
//! - [`RtgsPublisher`] sends a message and waits for the hub's correlated
//!   acknowledgement, one exchange at a time.
//! - [`RtgsSubscriber`] receives messages, dispatches each to the handler for
//!   its kind and acknowledges it back to the hub.
//!
//! Both talk to the hub through a [`HubConnector`]; [`GrpcConnector`] is the
//! production implementation. Failures that no caller is waiting on are
//! reported through the subscriber's [`ExceptionSink`].
//!
//! ```ignore
//! let options = RtgsSdkOptions::builder("RTGS:GB177550GB", "https://hub.example")
//!     .wait_for_acknowledgement_duration(Duration::from_secs(5))
//!     .build()?;
//!
//! let publisher = RtgsPublisher::connect(&options)?;
//! let result = publisher
//!     .send(&BankPartnersRequestV1 { rtgs_global_id: "RTGS:GB177550GB".into() }, &CancellationToken::new())
//!     .await?;
//! ```
//!
//! The SDK emits `tracing` events and `metrics` counters but installs neither
//! a subscriber nor a recorder.

pub mod config;
pub mod error;
pub mod exception;
pub mod frame;
pub mod messages;
mod metrics;
pub mod publisher;
pub mod signing;
pub mod subscriber;
pub mod transport;

pub use config::{ConfigError, RtgsSdkOptions, RtgsSdkOptionsBuilder};
pub use error::{
    HandlerError, HandlerValidationError, InboundError, PublisherError, SubscriberError,
    TransportError,
};
pub use exception::{ExceptionEvent, ExceptionListener, ExceptionSink, ListenerId};
pub use frame::{Acknowledgement, Frame, Headers};
pub use messages::{CodecError, InboundKind, InboundMessage, OutboundKind, OutboundMessage};
pub use publisher::{RtgsPublisher, SendResult, SendStatus};
pub use signing::{MessageSigner, MessageVerifier};
pub use subscriber::{
    FnHandler, Handler, MessageHandler, RtgsSubscriber, SubscriberState, TypedHandler,
    handler_fn, typed,
};
pub use transport::{Duplex, GrpcConnector, HubConnector, InboundStream};

/// Re-exported so callers need not depend on `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
