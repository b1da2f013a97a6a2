//! Message handlers and the per-run handler registry.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use strum::IntoEnumIterator;

use crate::error::{HandlerError, HandlerValidationError};
use crate::messages::{InboundKind, InboundMessage};

/// Handles one inbound message type.
///
/// Wrap an implementation with [`typed`] to hand it to the subscriber.
#[async_trait]
pub trait Handler<M: InboundMessage>: Send + Sync + 'static {
    async fn handle(&self, message: M) -> eyre::Result<()>;
}

/// A handler with its message type erased, as held by the subscriber.
///
/// Most callers never implement this directly; see [`typed`] and
/// [`handler_fn`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The kind this handler accepts.
    fn kind(&self) -> InboundKind;

    /// Decode `payload` and run the handler.
    async fn dispatch(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Adapts a [`Handler<M>`] into a [`MessageHandler`].
pub struct TypedHandler<M, H> {
    handler: H,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> TypedHandler<M, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _message: PhantomData,
        }
    }

    pub fn inner(&self) -> &H {
        &self.handler
    }
}

impl<M: InboundMessage, H> fmt::Debug for TypedHandler<M, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedHandler")
            .field("kind", &M::KIND)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M, H> MessageHandler for TypedHandler<M, H>
where
    M: InboundMessage,
    H: Handler<M>,
{
    fn kind(&self) -> InboundKind {
        M::KIND
    }

    async fn dispatch(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let message = M::from_payload(payload)?;
        self.handler
            .handle(message)
            .await
            .map_err(HandlerError::Failed)
    }
}

/// Erase a typed handler for [`RtgsSubscriber::start`](crate::RtgsSubscriber::start).
pub fn typed<M, H>(handler: H) -> Arc<dyn MessageHandler>
where
    M: InboundMessage,
    H: Handler<M>,
{
    Arc::new(TypedHandler::<M, H>::new(handler))
}

/// [`Handler`] backed by an async closure.
pub struct FnHandler<F>(F);

#[async_trait]
impl<M, F, Fut> Handler<M> for FnHandler<F>
where
    M: InboundMessage,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: M) -> eyre::Result<()> {
        (self.0)(message).await
    }
}

/// Build a handler for `M` from an async closure.
///
/// ```ignore
/// let handler = handler_fn(|message: EarmarkFundsV1| async move {
///     tracing::info!(lock_id = %message.lock_id, "earmark requested");
///     eyre::Ok(())
/// });
/// ```
pub fn handler_fn<M, F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    M: InboundMessage,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    typed::<M, _>(FnHandler(f))
}

/// Handlers indexed by kind, built once per subscriber run.
pub(crate) struct HandlerRegistry {
    handlers: HashMap<InboundKind, Arc<dyn MessageHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Index `handlers`, requiring exactly one per inbound kind.
    ///
    /// Duplicated and missing kinds are reported together in one error.
    pub(crate) fn build(
        handlers: &[Arc<dyn MessageHandler>],
    ) -> Result<Self, HandlerValidationError> {
        let mut by_kind = HashMap::with_capacity(handlers.len());
        let mut duplicate = BTreeSet::new();
        for handler in handlers {
            let kind = handler.kind();
            if by_kind.insert(kind, Arc::clone(handler)).is_some() {
                duplicate.insert(kind);
            }
        }

        let error = HandlerValidationError {
            duplicate: duplicate.into_iter().collect(),
            missing: InboundKind::iter()
                .filter(|kind| !by_kind.contains_key(kind))
                .collect(),
        };
        if !error.is_empty() {
            return Err(error);
        }

        Ok(Self { handlers: by_kind })
    }

    /// Find the handler for a frame identifier.
    pub(crate) fn resolve(&self, identifier: &str) -> Option<&Arc<dyn MessageHandler>> {
        InboundKind::from_identifier(identifier).and_then(|kind| self.handlers.get(&kind))
    }
}
