//! Signing and verification seams.
//!
//! The SDK does not sign anything itself. An embedding application that
//! needs signed flows plugs a [`MessageSigner`] into the publisher and a
//! [`MessageVerifier`] into the subscriber. Both run around the correlation
//! and dispatch core, never inside it.

use async_trait::async_trait;

use crate::frame::Frame;

/// Adds signature material to an outbound frame before it is written.
#[async_trait]
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait MessageSigner: Send + Sync {
    /// Sign `frame`, usually by inserting headers. An error aborts the send.
    async fn sign(&self, frame: &mut Frame) -> eyre::Result<()>;
}

/// Checks an inbound frame before it is dispatched.
#[async_trait]
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait MessageVerifier: Send + Sync {
    /// An error rejects the frame: the hub receives a failure
    /// acknowledgement and the error is reported as non-fatal.
    async fn verify(&self, frame: &Frame) -> eyre::Result<()>;
}
