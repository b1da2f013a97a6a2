//! Subscriber lifecycle and dispatch against an in-memory hub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use rtgs_sdk::messages::EarmarkFundsV1;
use rtgs_sdk::{
    ExceptionEvent, Frame, HandlerError, HandlerValidationError, InboundError, InboundKind,
    MessageHandler, MessageVerifier, RtgsSubscriber, SubscriberError, SubscriberState,
    TransportError, handler_fn,
};
use rtgs_test_utils::{HandlerSet, LogCapture, MockHub, RECV_TIMEOUT, inbound_frame, settle};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::Level;

async fn next_event(events: &mut broadcast::Receiver<ExceptionEvent>) -> ExceptionEvent {
    tokio::time::timeout(RECV_TIMEOUT, events.recv())
        .await
        .expect("no exception event reported")
        .unwrap()
}

fn earmark(lock_id: &str) -> serde_json::Value {
    json!({
        "LockId": lock_id,
        "Account": "GB33BUKB20201555555555",
        "Amount": { "Ccy": "GBP", "Amt": "100.00" },
    })
}

#[tokio::test]
async fn dispatches_and_acknowledges() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());

    subscriber.start(set.handlers()).await.unwrap();
    assert_eq!(subscriber.state(), SubscriberState::Running);
    assert!(hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-1", &earmark("lock-1"))));

    let ack = hub.next_subscriber_ack().await.unwrap();
    assert!(ack.success);
    assert_eq!(ack.correlation_id, "c-1");
    assert!(set.wait_for(1).await);
    assert_eq!(set.received(), [InboundKind::EarmarkFundsV1]);

    subscriber.stop().await;
    assert_eq!(subscriber.state(), SubscriberState::Stopped);
}

#[tokio::test]
async fn handler_failure_is_reported_and_loop_continues() {
    let hub = MockHub::new();
    let set = HandlerSet::new().failing(InboundKind::PayawayFundsV1, "ledger offline");
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();
    hub.deliver(inbound_frame(InboundKind::PayawayFundsV1, "c-1", &json!({})));
    hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-2", &earmark("lock-2")));

    // Acknowledgement precedes dispatch, so a failing handler still acks.
    let first = hub.next_subscriber_ack().await.unwrap();
    assert!(first.success);
    assert_eq!(first.correlation_id, "c-1");

    let event = next_event(&mut events).await;
    assert!(!event.is_fatal);
    assert!(matches!(
        &*event.error,
        InboundError::Handler {
            kind: InboundKind::PayawayFundsV1,
            error: HandlerError::Failed(report),
        } if report.to_string() == "ledger offline"
    ));

    let second = hub.next_subscriber_ack().await.unwrap();
    assert!(second.success);
    assert!(set.wait_for(2).await);
    assert_eq!(
        set.received(),
        [InboundKind::PayawayFundsV1, InboundKind::EarmarkFundsV1]
    );
    assert_eq!(subscriber.state(), SubscriberState::Running);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn panicking_handler_is_contained() {
    let hub = MockHub::new();
    let set = HandlerSet::new().panicking(InboundKind::EarmarkReleaseV1);
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();
    hub.deliver(inbound_frame(InboundKind::EarmarkReleaseV1, "c-1", &json!({})));

    let event = next_event(&mut events).await;
    assert!(!event.is_fatal);
    assert!(matches!(
        &*event.error,
        InboundError::Handler {
            kind: InboundKind::EarmarkReleaseV1,
            error: HandlerError::Panicked,
        }
    ));

    hub.deliver(inbound_frame(InboundKind::EarmarkCompleteV1, "c-2", &json!({})));
    assert!(set.wait_for(2).await);
    assert!(subscriber.is_running());
}

#[tokio::test]
async fn undecodable_payload_is_acknowledged_then_reported() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let (decoded_tx, mut decoded_rx) = mpsc::unbounded_channel();

    let mut handlers: Vec<Arc<dyn MessageHandler>> = set
        .handlers()
        .into_iter()
        .filter(|handler| handler.kind() != InboundKind::EarmarkFundsV1)
        .collect();
    handlers.push(handler_fn(move |message: EarmarkFundsV1| {
        let _ = decoded_tx.send(message);
        async { eyre::Ok(()) }
    }));

    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();
    subscriber.start(handlers).await.unwrap();

    hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-1", &json!({ "Bogus": 1 })));
    assert!(hub.next_subscriber_ack().await.unwrap().success);
    let event = next_event(&mut events).await;
    assert!(matches!(
        &*event.error,
        InboundError::Handler {
            kind: InboundKind::EarmarkFundsV1,
            error: HandlerError::Decode(_),
        }
    ));

    hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-2", &earmark("lock-7")));
    let decoded = tokio::time::timeout(RECV_TIMEOUT, decoded_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decoded.lock_id, "lock-7");
    assert_eq!(decoded.amount.amt, "100.00");
}

#[tokio::test]
async fn unknown_identifier_is_rejected() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();
    hub.deliver(Frame::new("NotAMessageV1", "c-9", b"{}".to_vec()));

    let ack = hub.next_subscriber_ack().await.unwrap();
    assert!(!ack.success);
    assert_eq!(ack.correlation_id, "c-9");
    assert_eq!(
        ack.reason.as_deref(),
        Some("No handler found for message NotAMessageV1")
    );

    let event = next_event(&mut events).await;
    assert!(!event.is_fatal);
    assert!(matches!(
        &*event.error,
        InboundError::NoHandler { identifier, correlation_id }
            if identifier == "NotAMessageV1" && correlation_id == "c-9"
    ));
    assert!(set.received().is_empty());
    assert!(subscriber.is_running());
}

#[tokio::test]
async fn missing_identifier_is_rejected() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();
    hub.deliver(Frame::new("", "c-0", b"{}".to_vec()));

    let ack = hub.next_subscriber_ack().await.unwrap();
    assert!(!ack.success);
    assert_eq!(ack.correlation_id, "c-0");
    assert_eq!(
        ack.reason.as_deref(),
        Some("Message with no identifier received")
    );

    let event = next_event(&mut events).await;
    assert_eq!(event.error.to_string(), "Message with no identifier received");
    assert!(subscriber.is_running());
}

#[tokio::test]
async fn invalid_handler_sets_leave_state_untouched() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());

    let missing: Vec<_> = set
        .handlers()
        .into_iter()
        .filter(|handler| handler.kind() != InboundKind::MessageRejectV1)
        .collect();
    match subscriber.start(missing.clone()).await {
        Err(SubscriberError::InvalidHandlers(error)) => assert_eq!(
            error,
            HandlerValidationError {
                duplicate: vec![],
                missing: vec![InboundKind::MessageRejectV1],
            }
        ),
        other => panic!("unexpected start result: {other:?}"),
    }

    let mut duplicated = set.handlers();
    duplicated.push(set.handler(InboundKind::AtomicLockResponseV1));
    match subscriber.start(duplicated).await {
        Err(SubscriberError::InvalidHandlers(error)) => assert_eq!(
            error,
            HandlerValidationError {
                duplicate: vec![InboundKind::AtomicLockResponseV1],
                missing: vec![],
            }
        ),
        other => panic!("unexpected start result: {other:?}"),
    }

    let mut both = missing;
    both.push(set.handler(InboundKind::EarmarkFundsV1));
    match subscriber.start(both).await {
        Err(SubscriberError::InvalidHandlers(error)) => {
            assert_eq!(error.duplicate, [InboundKind::EarmarkFundsV1]);
            assert_eq!(error.missing, [InboundKind::MessageRejectV1]);
        }
        other => panic!("unexpected start result: {other:?}"),
    }

    assert_eq!(subscriber.state(), SubscriberState::NotStarted);
    assert_eq!(hub.subscriber_connections(), 0);
}

#[tokio::test]
async fn refused_connection_keeps_subscriber_stopped() {
    let hub = MockHub::new();
    hub.refuse_connections(true);
    let subscriber = RtgsSubscriber::new(hub.clone());

    assert!(matches!(
        subscriber.start(HandlerSet::new().handlers()).await,
        Err(SubscriberError::Transport(TransportError::Unavailable(_)))
    ));
    assert_eq!(subscriber.state(), SubscriberState::NotStarted);

    hub.refuse_connections(false);
    subscriber.start(HandlerSet::new().handlers()).await.unwrap();
    assert!(subscriber.is_running());
}

#[tokio::test]
async fn only_one_concurrent_start_wins() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());

    let results = join_all((0..20).map(|_| subscriber.start(set.handlers()))).await;

    let started = results.iter().filter(|result| result.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(SubscriberError::AlreadyRunning)))
        .count();
    assert_eq!((started, rejected), (1, 19));
    assert_eq!(hub.subscriber_connections(), 1);
    assert!(subscriber.is_running());
}

fn spawn_start(
    subscriber: &Arc<RtgsSubscriber>,
    set: &HandlerSet,
) -> tokio::task::JoinHandle<Result<(), SubscriberError>> {
    let subscriber = Arc::clone(subscriber);
    let handlers = set.handlers();
    tokio::spawn(async move { subscriber.start(handlers).await })
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_start_stuck_connecting() {
    let hub = MockHub::new();
    hub.hold_connections();
    let set = HandlerSet::new();
    let subscriber = Arc::new(RtgsSubscriber::new(hub.clone()));

    let start = spawn_start(&subscriber, &set);
    settle().await;
    assert_eq!(subscriber.state(), SubscriberState::Starting);
    assert!(!subscriber.is_running());
    assert!(matches!(
        subscriber.start(set.handlers()).await,
        Err(SubscriberError::AlreadyRunning)
    ));

    tokio::time::timeout(Duration::from_secs(1), subscriber.stop())
        .await
        .expect("stop waited on a connect that never answers");
    assert!(matches!(
        start.await.unwrap(),
        Err(SubscriberError::StartCancelled)
    ));
    assert_eq!(subscriber.state(), SubscriberState::Stopped);
    assert_eq!(hub.subscriber_connections(), 0);

    hub.release_connections();
    subscriber.start(set.handlers()).await.unwrap();
    assert!(subscriber.is_running());
    assert_eq!(hub.subscriber_connections(), 1);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_start_stuck_connecting() {
    let hub = MockHub::new();
    hub.hold_connections();
    let set = HandlerSet::new();
    let subscriber = Arc::new(RtgsSubscriber::new(hub.clone()));
    subscriber
        .exceptions()
        .attach(|_: &ExceptionEvent| -> eyre::Result<()> { Ok(()) });

    let start = spawn_start(&subscriber, &set);
    settle().await;
    assert_eq!(subscriber.state(), SubscriberState::Starting);

    tokio::time::timeout(Duration::from_secs(1), subscriber.dispose())
        .await
        .expect("dispose waited on a connect that never answers");
    assert!(matches!(
        start.await.unwrap(),
        Err(SubscriberError::Disposed)
    ));
    assert_eq!(subscriber.state(), SubscriberState::Disposed);
    assert_eq!(subscriber.exceptions().listener_count(), 0);

    hub.release_connections();
    settle().await;
    assert!(matches!(
        subscriber.start(set.handlers()).await,
        Err(SubscriberError::Disposed)
    ));
    assert_eq!(hub.subscriber_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn released_connect_completes_pending_start() {
    let hub = MockHub::new();
    hub.hold_connections();
    let set = HandlerSet::new();
    let subscriber = Arc::new(RtgsSubscriber::new(hub.clone()));

    let start = spawn_start(&subscriber, &set);
    settle().await;
    assert_eq!(subscriber.state(), SubscriberState::Starting);

    hub.release_connections();
    start.await.unwrap().unwrap();
    assert!(subscriber.is_running());

    hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-1", &earmark("lock-1")));
    assert!(hub.next_subscriber_ack().await.unwrap().success);
    assert!(set.wait_for(1).await);
}

#[tokio::test(start_paused = true)]
async fn abandoned_start_reverts_state() {
    let hub = MockHub::new();
    hub.hold_connections();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());

    assert!(
        tokio::time::timeout(Duration::from_millis(50), subscriber.start(set.handlers()))
            .await
            .is_err()
    );
    assert_eq!(subscriber.state(), SubscriberState::NotStarted);

    hub.release_connections();
    subscriber.start(set.handlers()).await.unwrap();
    assert!(subscriber.is_running());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());

    subscriber.stop().await;
    assert_eq!(subscriber.state(), SubscriberState::NotStarted);

    subscriber.start(set.handlers()).await.unwrap();
    join_all((0..20).map(|_| subscriber.stop())).await;
    assert_eq!(subscriber.state(), SubscriberState::Stopped);

    subscriber.start(set.handlers()).await.unwrap();
    assert!(subscriber.is_running());
    assert_eq!(hub.subscriber_connections(), 2);
}

#[tokio::test]
async fn stream_failure_stops_subscriber() {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();
    hub.fail_subscriber_stream(tonic::Status::internal("hub crashed"));

    let event = next_event(&mut events).await;
    assert!(event.is_fatal);
    assert!(matches!(
        &*event.error,
        InboundError::StreamTerminated(TransportError::Status(status))
            if status.code() == tonic::Code::Internal
    ));
    assert_eq!(subscriber.state(), SubscriberState::Stopped);
    assert_eq!(
        logs.count(Level::ERROR, "Subscriber stream terminated unexpectedly"),
        1
    );

    subscriber.start(set.handlers()).await.unwrap();
    hub.deliver(inbound_frame(InboundKind::EarmarkReleaseV1, "c-1", &json!({})));
    assert!(hub.next_subscriber_ack().await.unwrap().success);
    assert_eq!(hub.subscriber_connections(), 2);
}

#[tokio::test]
async fn stream_close_stops_subscriber() {
    let hub = MockHub::new();
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(HandlerSet::new().handlers()).await.unwrap();
    hub.close_subscriber_stream();

    let event = next_event(&mut events).await;
    assert!(event.is_fatal);
    assert!(matches!(
        &*event.error,
        InboundError::StreamTerminated(TransportError::Closed)
    ));
    assert_eq!(subscriber.state(), SubscriberState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_message_in_hand() {
    let hub = MockHub::new();
    let (set, gate) = HandlerSet::new().blocking(InboundKind::EarmarkFundsV1);
    let subscriber = RtgsSubscriber::new(hub.clone());
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();
    hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-1", &earmark("lock-1")));
    assert!(hub.next_subscriber_ack().await.unwrap().success);
    assert!(set.wait_for(1).await);

    let stop = subscriber.stop();
    tokio::pin!(stop);
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut stop)
            .await
            .is_err(),
        "stop returned while a handler was still running"
    );

    gate.notify_one();
    stop.await;
    assert_eq!(subscriber.state(), SubscriberState::Stopped);

    settle().await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn dispose_is_terminal() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone());
    subscriber
        .exceptions()
        .attach(|_: &ExceptionEvent| -> eyre::Result<()> { Ok(()) });

    subscriber.start(set.handlers()).await.unwrap();
    tokio::join!(subscriber.dispose(), subscriber.dispose());

    assert_eq!(subscriber.state(), SubscriberState::Disposed);
    assert_eq!(subscriber.exceptions().listener_count(), 0);
    assert!(matches!(
        subscriber.start(set.handlers()).await,
        Err(SubscriberError::Disposed)
    ));

    subscriber.stop().await;
    subscriber.dispose().await;
    assert_eq!(subscriber.state(), SubscriberState::Disposed);
    assert_eq!(hub.subscriber_connections(), 1);
}

#[tokio::test]
async fn failing_listener_is_logged_and_skipped() {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let hub = MockHub::new();
    let subscriber = RtgsSubscriber::new(hub.clone());

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    subscriber
        .exceptions()
        .attach(|_: &ExceptionEvent| -> eyre::Result<()> { eyre::bail!("listener broke") });
    subscriber
        .exceptions()
        .attach(move |event: &ExceptionEvent| -> eyre::Result<()> {
            let _ = seen_tx.send(event.is_fatal);
            Ok(())
        });

    subscriber.start(HandlerSet::new().handlers()).await.unwrap();
    hub.deliver(Frame::new("NotAMessageV1", "c-1", b"{}".to_vec()));
    hub.deliver(Frame::new("NotAMessageV2", "c-2", b"{}".to_vec()));

    for _ in 0..2 {
        assert!(!hub.next_subscriber_ack().await.unwrap().success);
        let fatal = tokio::time::timeout(RECV_TIMEOUT, seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!fatal);
    }

    assert_eq!(logs.count(Level::ERROR, "Exception listener failed"), 2);
    assert!(subscriber.is_running());
}

struct RequireSignature;

#[async_trait]
impl MessageVerifier for RequireSignature {
    async fn verify(&self, frame: &Frame) -> eyre::Result<()> {
        match frame.headers.get("signature") {
            Some(_) => Ok(()),
            None => eyre::bail!("missing signature"),
        }
    }
}

#[tokio::test]
async fn verifier_gates_dispatch() {
    let hub = MockHub::new();
    let set = HandlerSet::new();
    let subscriber = RtgsSubscriber::new(hub.clone()).with_verifier(RequireSignature);
    let mut events = subscriber.exceptions().subscribe();

    subscriber.start(set.handlers()).await.unwrap();

    hub.deliver(inbound_frame(InboundKind::EarmarkFundsV1, "c-1", &earmark("lock-1")));
    let ack = hub.next_subscriber_ack().await.unwrap();
    assert!(!ack.success);
    assert_eq!(ack.correlation_id, "c-1");
    assert_eq!(
        ack.reason.as_deref(),
        Some("Verification of EarmarkFundsV1 message failed: missing signature")
    );
    let event = next_event(&mut events).await;
    assert!(matches!(&*event.error, InboundError::Verification { .. }));

    let mut signed = inbound_frame(InboundKind::EarmarkFundsV1, "c-2", &earmark("lock-2"));
    signed.headers.insert("signature", "valid");
    hub.deliver(signed);
    assert!(hub.next_subscriber_ack().await.unwrap().success);
    assert!(set.wait_for(1).await);
    assert_eq!(set.received(), [InboundKind::EarmarkFundsV1]);
}
