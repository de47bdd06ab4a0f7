use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use trestle::bridge::{await_blocking, await_result};
use trestle::task::{self, TaskState};
use trestle::time::sleep;
use trestle::{BridgeError, Runtime, RuntimeBuilder, yield_now};

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);

    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_builder_starts_requested_contexts() {
    let runtime = RuntimeBuilder::new().contexts(3).build();

    assert_eq!(runtime.contexts().len(), 3);
    assert!(runtime.context(2).is_some());
    assert!(runtime.context(3).is_none());

    let created = runtime.create_context();
    assert_eq!(created.index(), 3);
    assert_eq!(runtime.contexts().len(), 4);

    let value = runtime.block_on_context(created, async { task::current_context() });
    assert_eq!(value, Some(created));
}

#[test]
#[should_panic(expected = "contexts must be > 0")]
fn test_builder_rejects_zero_contexts() {
    let _ = RuntimeBuilder::new().contexts(0);
}

#[test]
fn test_default_runtime_block_on() {
    let runtime = Runtime::new();

    let result = runtime.block_on(async {
        yield_now().await;
        40 + 2
    });

    assert_eq!(result, 42);
}

#[trestle::test]
async fn test_yield_now_lets_other_tasks_run() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = task::launch({
        let order = order.clone();
        async move {
            order.lock().push(1);
            yield_now().await;
            order.lock().push(3);
        }
    });

    let second = task::launch({
        let order = order.clone();
        async move {
            order.lock().push(2);
        }
    });

    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(*order.lock(), vec![1, 2, 3]);
}

#[trestle::test]
async fn test_join_handle_reports_completion() {
    let mut handle = task::launch(async { 3 });

    assert_eq!((&mut handle).await.unwrap(), 3);
    assert!(handle.is_finished());
    assert_eq!(handle.state(), TaskState::Completed);
    assert!(!handle.cancel());
}

#[trestle::test]
async fn test_task_handle_cancels_from_another_thread() {
    let handle = task::launch(async {
        sleep(Duration::from_secs(10)).await;
        1
    });

    yield_now().await;

    let remote = handle.task_handle();
    assert_eq!(remote.context(), handle.context());

    let cancelled = await_blocking(move || remote.cancel()).await.unwrap();

    assert!(cancelled);
    assert!(matches!(handle.await, Err(BridgeError::Cancelled)));
}

#[test]
fn test_panicking_task_reports_panicked() {
    let runtime = RuntimeBuilder::new().contexts(1).build();
    let context = runtime.context(0).unwrap();

    let handle = runtime
        .launch(context, async {
            if true {
                panic!("kaboom");
            }
            1u32
        })
        .unwrap();

    match runtime.block_on(handle) {
        Err(BridgeError::Panicked(message)) => assert!(message.contains("kaboom")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The context survives the panic.
    assert_eq!(runtime.block_on(async { 5 }), 5);
}

#[test]
#[should_panic(expected = "kaboom")]
fn test_block_on_reraises_panic() {
    let runtime = RuntimeBuilder::new().contexts(1).build();

    runtime.block_on(async {
        if true {
            panic!("kaboom");
        }
        0
    });
}

#[test]
fn test_close_context_cancels_suspended_tasks() {
    let runtime = RuntimeBuilder::new().contexts(2).build();
    let context = runtime.context(1).unwrap();
    let dispatcher = runtime.dispatcher(context).unwrap();

    let handle = runtime
        .launch(context, async { await_result::<u32, _>(drop).await })
        .unwrap();

    wait_until(|| handle.state() == TaskState::Suspended);
    assert_eq!(runtime.task_count(context), 1);

    assert!(runtime.close_context(context));

    assert!(matches!(runtime.block_on(handle), Err(BridgeError::Cancelled)));
    assert!(dispatcher.is_closed());
    assert!(matches!(
        dispatcher.dispatch(|| {}),
        Err(BridgeError::ContextClosed)
    ));
    assert!(matches!(
        runtime.dispatcher(context),
        Err(BridgeError::ContextClosed)
    ));

    let late = runtime.launch(context, async { 1 }).unwrap();
    assert!(late.is_finished());
    assert!(matches!(runtime.block_on(late), Err(BridgeError::Cancelled)));

    assert_eq!(runtime.contexts().len(), 1);
}

#[test]
fn test_launch_on_unknown_context() {
    let first = RuntimeBuilder::new().contexts(1).build();
    let second = RuntimeBuilder::new().contexts(3).build();
    let foreign = second.context(2).unwrap();

    assert!(matches!(
        first.launch(foreign, async {}),
        Err(BridgeError::ContextClosed)
    ));
    assert!(matches!(
        first.dispatcher(foreign),
        Err(BridgeError::ContextClosed)
    ));
}

#[test]
fn test_shutdown_is_idempotent() {
    let runtime = RuntimeBuilder::new().contexts(2).build();
    let context = runtime.context(0).unwrap();

    runtime.shutdown();
    runtime.shutdown();

    assert!(runtime.contexts().is_empty());
    assert!(matches!(
        runtime.dispatcher(context),
        Err(BridgeError::ContextClosed)
    ));

    let handle = runtime.launch(context, async { 1 }).unwrap();
    assert!(handle.is_finished());
    assert_eq!(handle.state(), TaskState::Cancelled);
}

#[test]
fn test_block_on_inside_context_is_rejected() {
    let runtime = Arc::new(RuntimeBuilder::new().contexts(1).build());
    let inner = runtime.clone();

    let rejected = runtime.block_on(async move {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            inner.block_on(async {});
        }))
        .is_err()
    });

    assert!(rejected);
}
