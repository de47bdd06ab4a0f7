use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use trestle::bridge::{Continuation, await_result, suspend};
use trestle::time::sleep;
use trestle::{BridgeError, task, yield_now};

#[trestle::test]
async fn test_await_result_success() {
    let value = await_result(|completion| {
        let _ = completion.succeed(7u32);
    })
    .await;

    assert_eq!(value.unwrap(), 7);
}

#[trestle::test]
async fn test_await_result_failure_is_typed() {
    let err = await_result::<u32, _>(|completion| {
        let _ = completion.fail("boom");
    })
    .await
    .unwrap_err();

    match err {
        BridgeError::Operation(cause) => assert_eq!(cause.to_string(), "boom"),
        other => panic!("unexpected error: {other}"),
    }
}

#[trestle::test]
async fn test_await_result_completed_from_foreign_thread() {
    let value = await_result(|completion| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let _ = completion.complete(Ok::<_, std::io::Error>("late"));
        });
    })
    .await;

    assert_eq!(value.unwrap(), "late");
}

#[trestle::test]
async fn test_continuation_resumes_at_most_once() {
    let results = Arc::new(Mutex::new(None));
    let slot = results.clone();

    let value = suspend(move |continuation: Continuation<u32>| {
        let first = continuation.succeed(1);
        let second = continuation.succeed(2);
        *slot.lock() = Some((first, second));
    })
    .await;

    assert_eq!(value.unwrap(), 1);

    let (first, second) = results.lock().take().unwrap();
    assert!(first.is_ok());
    assert!(matches!(second, Err(BridgeError::AlreadyResumed)));
}

#[trestle::test]
async fn test_racing_resumes_deliver_exactly_one() {
    let winners = Arc::new(AtomicUsize::new(0));
    let resumed = Arc::new(AtomicUsize::new(0));
    let counter = winners.clone();

    let value = suspend(move |continuation: Continuation<usize>| {
        for i in 0..8 {
            let continuation = continuation.clone();
            let counter = counter.clone();

            thread::spawn(move || {
                if continuation.succeed(i).is_ok() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    })
    .await
    .unwrap();

    resumed.fetch_add(1, Ordering::SeqCst);
    sleep(Duration::from_millis(50)).await;

    assert!(value < 8);
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
}

#[trestle::test]
async fn test_synchronous_completion_resumes_on_next_turn() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = trestle::current_dispatcher().unwrap();
    let log = order.clone();

    let value = await_result(move |completion| {
        let queued = log.clone();
        dispatcher
            .dispatch(move || queued.lock().push("queued"))
            .unwrap();

        let _ = completion.succeed(5);
        log.lock().push("completed");
    })
    .await
    .unwrap();

    order.lock().push("resumed");

    assert_eq!(value, 5);
    assert_eq!(*order.lock(), vec!["completed", "queued", "resumed"]);
}

#[trestle::test]
async fn test_cancelled_task_ignores_late_completion() {
    let stash = Arc::new(Mutex::new(None));
    let slot = stash.clone();

    let handle = task::launch(async move {
        await_result::<u32, _>(move |completion| {
            *slot.lock() = Some(completion);
        })
        .await
    });

    loop {
        let registered = stash.lock().is_some();
        if registered {
            break;
        }
        yield_now().await;
    }

    assert!(handle.cancel());
    assert!(matches!(handle.await, Err(BridgeError::Cancelled)));

    let completion = stash.lock().take().unwrap();
    assert!(completion.is_cancelled());
    assert!(matches!(completion.succeed(1), Err(BridgeError::Cancelled)));
}

#[trestle::test]
async fn test_dropped_completion_leaves_task_suspended() {
    let handle = task::launch(async {
        await_result::<u32, _>(drop).await
    });

    for _ in 0..5 {
        yield_now().await;
    }

    assert_eq!(handle.state(), task::TaskState::Suspended);
    assert!(!handle.is_finished());

    assert!(handle.cancel());
    assert!(matches!(handle.await, Err(BridgeError::Cancelled)));
}
