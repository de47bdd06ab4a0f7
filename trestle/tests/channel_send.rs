use std::marker::PhantomPinned;
use trestle::channel::memory::{EventSource, WriteQueue};
use trestle::channel::SendChannel;
use trestle::task::{self, TaskState};
use trestle::{BridgeError, ChannelBuilder, RuntimeBuilder, yield_now};

#[trestle::test]
async fn test_send_writes_through_to_sink() {
    let sink = WriteQueue::new(8);
    let channel = ChannelBuilder::new().send(sink.clone());

    for value in ["a", "b", "c"] {
        channel.send(value).await.unwrap();
    }

    assert_eq!(sink.take_all(), vec!["a", "b", "c"]);
}

/// A payload that is not `Unpin`.
#[derive(Debug, PartialEq)]
struct Pinned {
    value: u32,
    _pin: PhantomPinned,
}

async fn forward<T: Send + 'static>(channel: &SendChannel<T>, values: Vec<T>) {
    for value in values {
        channel.send(value).await.unwrap();
    }
}

#[trestle::test]
async fn test_send_accepts_values_that_are_not_unpin() {
    let sink = WriteQueue::new(4);
    let channel = ChannelBuilder::new().send(sink.clone());

    let values = (0..2)
        .map(|value| Pinned {
            value,
            _pin: PhantomPinned,
        })
        .collect();

    forward(&channel, values).await;

    let sent: Vec<u32> = sink.take_all().into_iter().map(|p| p.value).collect();
    assert_eq!(sent, vec![0, 1]);
}

#[trestle::test]
async fn test_sender_suspends_until_sink_drains() {
    let sink = WriteQueue::new(3);
    let channel = ChannelBuilder::new().send(sink.clone());

    for value in 0..3 {
        channel.send(value).await.unwrap();
    }
    assert!(sink.is_full());

    let sender = channel.clone();
    let blocked = task::launch(async move { sender.send(3).await });

    yield_now().await;

    assert!(!blocked.is_finished());
    assert_eq!(blocked.state(), TaskState::Suspended);

    assert_eq!(sink.take_all(), vec![0, 1, 2]);

    blocked.await.unwrap().unwrap();
    assert_eq!(sink.take_all(), vec![3]);
}

#[trestle::test]
async fn test_partial_drain_below_half_wakes_sender() {
    let sink = WriteQueue::new(4);
    let channel = ChannelBuilder::new().send(sink.clone());

    for value in 0..4 {
        channel.send(value).await.unwrap();
    }

    let sender = channel.clone();
    let blocked = task::launch(async move { sender.send(4).await });
    yield_now().await;

    // Three items left: still above half, the sender keeps waiting.
    assert_eq!(sink.take(1), vec![0]);
    yield_now().await;
    assert!(!blocked.is_finished());

    assert_eq!(sink.take(1), vec![1]);
    blocked.await.unwrap().unwrap();

    assert_eq!(sink.take_all(), vec![2, 3, 4]);
}

#[trestle::test]
async fn test_close_fails_waiting_and_later_sends() {
    let sink = WriteQueue::new(1);
    let channel = ChannelBuilder::new().send(sink.clone());

    channel.send(1).await.unwrap();

    let sender = channel.clone();
    let blocked = task::launch(async move { sender.send(2).await });
    yield_now().await;

    channel.close();

    assert!(matches!(
        blocked.await.unwrap(),
        Err(BridgeError::ChannelClosed)
    ));
    assert!(matches!(
        channel.send(3).await,
        Err(BridgeError::ChannelClosed)
    ));

    assert!(channel.is_closed());
    assert!(sink.is_closed());
    assert_eq!(sink.take_all(), vec![1]);
}

#[trestle::test]
async fn test_concurrent_send_is_rejected() {
    let sink = WriteQueue::new(1);
    let channel = ChannelBuilder::new().send(sink.clone());

    channel.send(1).await.unwrap();

    let sender = channel.clone();
    let first = task::launch(async move { sender.send(2).await });
    yield_now().await;

    assert!(matches!(
        channel.send(3).await,
        Err(BridgeError::ConcurrentSend)
    ));

    assert_eq!(sink.take_all(), vec![1]);
    first.await.unwrap().unwrap();
    assert_eq!(sink.take_all(), vec![2]);
}

#[trestle::test]
async fn test_cancelled_sender_frees_the_slot() {
    let sink = WriteQueue::new(1);
    let channel = ChannelBuilder::new().send(sink.clone());

    channel.send(1).await.unwrap();

    let sender = channel.clone();
    let blocked = task::launch(async move { sender.send(2).await });
    yield_now().await;

    assert!(blocked.cancel());
    assert!(matches!(blocked.await, Err(BridgeError::Cancelled)));

    assert_eq!(sink.take_all(), vec![1]);
    channel.send(3).await.unwrap();
    assert_eq!(sink.take_all(), vec![3]);
}

#[trestle::test]
async fn test_duplex_source_failure_fails_send_side() {
    let source = EventSource::new();
    let sink = WriteQueue::new(4);
    let channel = ChannelBuilder::new().duplex(source.clone(), sink.clone());

    channel.send(1).await.unwrap();
    source.fail("transport reset");

    assert!(matches!(
        channel.receive().await,
        Err(BridgeError::Operation(_))
    ));

    match channel.send(2).await {
        Err(BridgeError::Operation(cause)) => assert_eq!(cause.to_string(), "transport reset"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(sink.take_all(), vec![1]);
}

#[trestle::test]
async fn test_duplex_round_trip_and_close() {
    let source = EventSource::new();
    let sink = WriteQueue::new(4);
    let channel = ChannelBuilder::new().duplex(source.clone(), sink.clone());

    source.emit(10);
    let value = channel.receive().await.unwrap().unwrap();
    channel.send(value * 2).await.unwrap();

    assert_eq!(sink.take_all(), vec![20]);

    channel.close();
    assert_eq!(channel.receive().await.unwrap(), None);
    assert!(matches!(
        channel.send(1).await,
        Err(BridgeError::ChannelClosed)
    ));
    assert_eq!(source.subscriber_count(), 0);
}

#[test]
fn test_runtime_channels_use_configured_capacity() {
    let runtime = RuntimeBuilder::new()
        .contexts(1)
        .channel_capacity(8)
        .build();

    let channel = runtime.receive_channel(EventSource::<u32>::new());
    assert_eq!(channel.capacity(), 8);

    let source = EventSource::new();

    let sink = WriteQueue::new(2);
    let duplex = runtime.channel(source.clone(), sink.clone());

    source.emit(3u32);

    let received = runtime.block_on(async move {
        let value = duplex.receive().await.unwrap();
        duplex.send(4).await.unwrap();
        value
    });

    assert_eq!(received, Some(3));
    assert_eq!(sink.take_all(), vec![4]);
}
