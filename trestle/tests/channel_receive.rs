use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use trestle::bridge::Subscription;
use trestle::channel::memory::EventSource;
use trestle::channel::{PushSource, SourceHandlers};
use trestle::time::sleep;
use trestle::{BridgeError, ChannelBuilder, select, task, yield_now};

/// A source that never honors pause requests.
#[derive(Clone, Default)]
struct Firehose {
    handlers: Arc<Mutex<Option<SourceHandlers<u32>>>>,
}

impl Firehose {
    fn push(&self, value: u32) {
        let handlers = self.handlers.lock().clone();
        if let Some(handlers) = handlers {
            handlers.value(value);
        }
    }
}

impl PushSource<u32> for Firehose {
    fn subscribe(&self, handlers: SourceHandlers<u32>) -> Subscription {
        *self.handlers.lock() = Some(handlers);

        let slot = self.handlers.clone();
        Subscription::new(move || {
            slot.lock().take();
        })
    }
}

/// An event source that takes a while to honor pause requests.
struct SlowPause {
    inner: EventSource<u32>,
    delay: Duration,
}

impl PushSource<u32> for SlowPause {
    fn subscribe(&self, handlers: SourceHandlers<u32>) -> Subscription {
        self.inner.subscribe(handlers)
    }

    fn pause(&self) {
        thread::sleep(self.delay);
        self.inner.pause();
    }

    fn resume(&self) {
        self.inner.resume();
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[trestle::test]
async fn test_receives_values_then_end() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    let producer = source.clone();
    thread::spawn(move || {
        for value in [1, 2, 3] {
            producer.emit(value);
        }
        producer.end();
    });

    let mut received = Vec::new();
    while let Some(value) = channel.receive().await.unwrap() {
        received.push(value);
    }

    assert_eq!(received, vec![1, 2, 3]);
    assert_eq!(channel.receive().await.unwrap(), None);
    assert_eq!(source.subscriber_count(), 0);
}

#[trestle::test]
async fn test_values_emitted_before_subscribing_are_kept() {
    let source = EventSource::new();
    source.emit("a");
    source.emit("b");

    let channel = ChannelBuilder::new().receive(source.clone());

    assert_eq!(channel.buffered_len(), 2);
    assert_eq!(channel.receive().await.unwrap(), Some("a"));
    assert_eq!(channel.receive().await.unwrap(), Some("b"));
}

#[trestle::test]
async fn test_pauses_source_at_capacity() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().capacity(4).receive(source.clone());

    for value in 0..10 {
        source.emit(value);
    }

    assert_eq!(channel.buffered_len(), 4);
    assert!(channel.is_source_paused());
    assert!(source.is_paused());
    assert_eq!(source.pending_len(), 6);

    // Above the low-water mark the source stays paused.
    assert_eq!(channel.receive().await.unwrap(), Some(0));
    assert!(source.is_paused());
    assert_eq!(source.pending_len(), 6);

    // Draining to the low-water mark lets the source deliver again.
    assert_eq!(channel.receive().await.unwrap(), Some(1));
    assert_eq!(source.pending_len(), 4);
    assert!(channel.buffered_len() <= 4);

    let mut rest = Vec::new();
    for _ in 0..8 {
        rest.push(channel.receive().await.unwrap().unwrap());
    }

    assert_eq!(rest, (2..10).collect::<Vec<_>>());
    assert_eq!(channel.buffered_len(), 0);
}

#[trestle::test]
async fn test_late_pause_does_not_strand_source() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().capacity(1).receive(SlowPause {
        inner: source.clone(),
        delay: Duration::from_millis(200),
    });

    let producer = source.clone();
    thread::spawn(move || {
        producer.emit(1);
        producer.emit(2);
    });

    // Receive while the producer is still inside the slow pause.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(channel.receive().await.unwrap(), Some(1));

    let second = select! {
        channel.receive() => |value| Some(value),
        sleep(Duration::from_secs(2)) => |_| None,
    };

    assert_eq!(second.unwrap().unwrap(), Some(2));
    assert_eq!(source.pending_len(), 0);
}

#[trestle::test]
async fn test_custom_low_water_mark() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new()
        .capacity(4)
        .low_water(0)
        .receive(source.clone());

    for value in 0..6 {
        source.emit(value);
    }

    for expected in 0..3 {
        assert_eq!(channel.receive().await.unwrap(), Some(expected));
        assert!(source.is_paused());
    }

    assert_eq!(channel.receive().await.unwrap(), Some(3));
    assert!(!source.is_paused());
    assert_eq!(channel.buffered_len(), 2);
}

#[trestle::test]
async fn test_bound_is_advisory_for_sources_ignoring_pause() {
    init_tracing();

    let source = Firehose::default();
    let channel = ChannelBuilder::new().capacity(4).receive(source.clone());

    for value in 0..10 {
        source.push(value);
    }

    assert_eq!(channel.buffered_len(), 10);
    assert!(channel.is_source_paused());

    for expected in 0..10 {
        assert_eq!(channel.receive().await.unwrap(), Some(expected));
    }
}

#[trestle::test]
async fn test_end_is_sticky() {
    let source = EventSource::<u8>::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    source.end();
    source.emit(1);

    assert!(channel.is_terminated());
    assert_eq!(channel.receive().await.unwrap(), None);
    assert_eq!(channel.receive().await.unwrap(), None);
    assert_eq!(source.subscriber_count(), 0);

    channel.close();
    assert_eq!(channel.receive().await.unwrap(), None);
}

#[trestle::test]
async fn test_failure_after_buffered_values_is_sticky() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    source.emit(1);
    source.fail("connection reset");

    assert_eq!(channel.receive().await.unwrap(), Some(1));

    for _ in 0..2 {
        match channel.receive().await {
            Err(BridgeError::Operation(cause)) => {
                assert_eq!(cause.to_string(), "connection reset")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(source.subscriber_count(), 0);
}

#[trestle::test]
async fn test_close_resumes_waiting_receiver() {
    let source = EventSource::<u32>::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    let receiver = channel.clone();
    let waiting = task::launch(async move { receiver.receive().await });

    yield_now().await;
    assert!(!waiting.is_finished());

    channel.close();

    assert_eq!(waiting.await.unwrap().unwrap(), None);
    assert_eq!(source.subscriber_count(), 0);

    source.emit(5);
    assert_eq!(channel.receive().await.unwrap(), None);
}

#[trestle::test]
async fn test_close_discards_buffered_values() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    source.emit(1);
    source.emit(2);
    channel.close();

    assert_eq!(channel.buffered_len(), 0);
    assert_eq!(channel.receive().await.unwrap(), None);
}

#[trestle::test]
async fn test_concurrent_receive_is_rejected() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    let receiver = channel.clone();
    let first = task::launch(async move { receiver.receive().await });

    yield_now().await;

    assert!(matches!(
        channel.receive().await,
        Err(BridgeError::ConcurrentReceive)
    ));

    source.emit(7);
    assert_eq!(first.await.unwrap().unwrap(), Some(7));
}

#[trestle::test]
async fn test_cancelled_receiver_frees_the_slot() {
    let source = EventSource::new();
    let channel = ChannelBuilder::new().receive(source.clone());

    let receiver = channel.clone();
    let waiting = task::launch(async move { receiver.receive().await });

    yield_now().await;

    assert!(waiting.cancel());
    assert!(matches!(waiting.await, Err(BridgeError::Cancelled)));

    source.emit(9);
    assert_eq!(channel.receive().await.unwrap(), Some(9));
}

#[trestle::test]
async fn test_dropping_last_handle_unsubscribes() {
    let source = EventSource::<u32>::new();
    let channel = ChannelBuilder::new().receive(source.clone());
    let other = channel.clone();

    assert_eq!(source.subscriber_count(), 1);

    drop(channel);
    assert_eq!(source.subscriber_count(), 1);

    drop(other);
    assert_eq!(source.subscriber_count(), 0);
}

#[trestle::test]
async fn test_new_subscriber_starts_unpaused() {
    let source = EventSource::<u32>::new();
    let first = ChannelBuilder::new().capacity(2).receive(source.clone());

    for value in 0..3 {
        source.emit(value);
    }

    assert!(source.is_paused());
    assert_eq!(source.pending_len(), 1);

    first.close();
    assert!(!source.is_paused());

    let second = ChannelBuilder::new().capacity(2).receive(source.clone());
    assert_eq!(second.receive().await.unwrap(), Some(2));

    source.emit(3);
    assert_eq!(second.receive().await.unwrap(), Some(3));
}
