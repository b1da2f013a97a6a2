//! In-memory hub.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use rtgs_sdk::{Acknowledgement, Duplex, Frame, HubConnector, TransportError};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How long the `next_*` helpers wait before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

const OUTBOUND_CAPACITY: usize = 16;

/// The hub's end of one open stream.
struct Connection<T> {
    inbound: mpsc::UnboundedSender<Result<T, TransportError>>,
    closed: Option<oneshot::Sender<()>>,
}

impl<T> Connection<T> {
    fn push(&self, item: Result<T, TransportError>) -> bool {
        self.inbound.send(item).is_ok()
    }

    /// End the read side the client sees and stop accepting writes.
    fn close(mut self, error: Option<TransportError>) {
        if let Some(error) = error {
            let _ = self.inbound.send(Err(error));
        }
        if let Some(closed) = self.closed.take() {
            let _ = closed.send(());
        }
    }
}

/// Records what one side of the client wrote, across reconnects.
struct Recorder<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }
}

impl<T> Recorder<T> {
    async fn next(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(RECV_TIMEOUT, rx.recv()).await.ok().flatten()
    }

    fn try_next(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[derive(Default)]
struct HubState {
    refuse: AtomicBool,
    hold: AtomicBool,
    released: Notify,
    publisher: Mutex<Option<Connection<Acknowledgement>>>,
    publisher_connections: AtomicUsize,
    published: Recorder<Frame>,
    subscriber: Mutex<Option<Connection<Frame>>>,
    subscriber_connections: AtomicUsize,
    acknowledged: Recorder<Acknowledgement>,
}

/// A [`HubConnector`] that keeps both streams in memory.
///
/// Frames written by a publisher and acknowledgements written by a
/// subscriber are recorded in order across reconnects. Tests drive the
/// other direction with [`acknowledge`](Self::acknowledge) and
/// [`deliver`](Self::deliver). Clones share the same hub.
#[derive(Clone, Default)]
pub struct MockHub {
    state: Arc<HubState>,
}

impl std::fmt::Debug for MockHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHub")
            .field("publisher_connections", &self.publisher_connections())
            .field("subscriber_connections", &self.subscriber_connections())
            .finish_non_exhaustive()
    }
}

impl MockHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later open fail with [`TransportError::Unavailable`].
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make every later open wait, without answering, until
    /// [`release_connections`](Self::release_connections).
    pub fn hold_connections(&self) {
        self.state.hold.store(true, Ordering::SeqCst);
    }

    /// Let held and later opens proceed.
    pub fn release_connections(&self) {
        self.state.hold.store(false, Ordering::SeqCst);
        self.state.released.notify_waiters();
    }

    /// Number of publisher streams opened so far.
    pub fn publisher_connections(&self) -> usize {
        self.state.publisher_connections.load(Ordering::SeqCst)
    }

    /// Next frame a publisher wrote, or `None` after [`RECV_TIMEOUT`].
    pub async fn next_publisher_frame(&self) -> Option<Frame> {
        self.state.published.next().await
    }

    /// A frame the publisher already wrote, without waiting.
    pub fn try_next_publisher_frame(&self) -> Option<Frame> {
        self.state.published.try_next()
    }

    /// Send an acknowledgement down the current publisher stream.
    ///
    /// Returns `false` if no publisher stream is open.
    pub fn acknowledge(&self, ack: Acknowledgement) -> bool {
        self.state
            .publisher
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.push(Ok(ack)))
    }

    /// Fail the current publisher stream with `status`.
    pub fn fail_publisher_stream(&self, status: tonic::Status) {
        if let Some(connection) = self.state.publisher.lock().take() {
            connection.close(Some(TransportError::Status(status)));
        }
    }

    /// Complete the current publisher stream without an error.
    pub fn close_publisher_stream(&self) {
        if let Some(connection) = self.state.publisher.lock().take() {
            connection.close(None);
        }
    }

    /// Number of subscriber streams opened so far.
    pub fn subscriber_connections(&self) -> usize {
        self.state.subscriber_connections.load(Ordering::SeqCst)
    }

    /// Push a frame down the current subscriber stream.
    ///
    /// Returns `false` if no subscriber stream is open.
    pub fn deliver(&self, frame: Frame) -> bool {
        self.state
            .subscriber
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.push(Ok(frame)))
    }

    /// Next acknowledgement a subscriber wrote, or `None` after
    /// [`RECV_TIMEOUT`].
    pub async fn next_subscriber_ack(&self) -> Option<Acknowledgement> {
        self.state.acknowledged.next().await
    }

    /// An acknowledgement the subscriber already wrote, without waiting.
    pub fn try_next_subscriber_ack(&self) -> Option<Acknowledgement> {
        self.state.acknowledged.try_next()
    }

    /// Fail the current subscriber stream with `status`.
    pub fn fail_subscriber_stream(&self, status: tonic::Status) {
        if let Some(connection) = self.state.subscriber.lock().take() {
            connection.close(Some(TransportError::Status(status)));
        }
    }

    /// Complete the current subscriber stream without an error.
    pub fn close_subscriber_stream(&self) {
        if let Some(connection) = self.state.subscriber.lock().take() {
            connection.close(None);
        }
    }

    async fn wait_until_released(&self) {
        loop {
            let released = self.state.released.notified();
            if !self.state.hold.load(Ordering::SeqCst) {
                return;
            }
            released.await;
        }
    }

    fn check_refused(&self) -> Result<(), TransportError> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

/// Wire up one stream: writes are forwarded into `recorder` until the hub
/// closes the connection, reads come from the returned connection handle.
fn open<Out, In>(recorder: mpsc::UnboundedSender<Out>) -> (Duplex<Out, In>, Connection<In>)
where
    Out: Send + 'static,
    In: Send + 'static,
{
    let (outbound, mut written) = mpsc::channel::<Out>(OUTBOUND_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (closed_tx, mut closed_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut closed_rx => break,
                item = written.recv() => match item {
                    Some(item) => {
                        let _ = recorder.send(item);
                    }
                    None => break,
                },
            }
        }
    });

    let duplex = Duplex {
        outbound,
        inbound: UnboundedReceiverStream::new(inbound_rx).boxed(),
    };
    let connection = Connection {
        inbound: inbound_tx,
        closed: Some(closed_tx),
    };
    (duplex, connection)
}

#[async_trait]
impl HubConnector for MockHub {
    async fn open_publisher_stream(&self) -> Result<Duplex<Frame, Acknowledgement>, TransportError> {
        self.wait_until_released().await;
        self.check_refused()?;
        let (duplex, connection) = open(self.state.published.tx.clone());
        if let Some(previous) = self.state.publisher.lock().replace(connection) {
            previous.close(None);
        }
        self.state.publisher_connections.fetch_add(1, Ordering::SeqCst);
        Ok(duplex)
    }

    async fn open_subscriber_stream(&self) -> Result<Duplex<Acknowledgement, Frame>, TransportError> {
        self.wait_until_released().await;
        self.check_refused()?;
        let (duplex, connection) = open(self.state.acknowledged.tx.clone());
        if let Some(previous) = self.state.subscriber.lock().replace(connection) {
            previous.close(None);
        }
        self.state.subscriber_connections.fetch_add(1, Ordering::SeqCst);
        Ok(duplex)
    }
}
