use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use trestle::bridge::{EventHandler, Subscription, await_blocking, await_event, await_result};
use trestle::time::{TimerId, Timers, sleep};
use trestle::{BridgeError, RuntimeBuilder, task};

#[trestle::test]
async fn test_sleep_basic() {
    let start = Instant::now();
    sleep(Duration::from_millis(20)).await;

    assert!(
        start.elapsed() >= Duration::from_millis(20),
        "sleep returned too early"
    );
}

#[trestle::test]
async fn test_sleep_zero() {
    sleep(Duration::ZERO).await;
}

#[trestle::test]
async fn test_await_event_first_occurrence_wins() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = cancelled.clone();

    let value = await_event(move |handler: EventHandler<u64>| {
        handler.fire(42);
        handler.fire(42);

        Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })
    .await
    .unwrap();

    assert_eq!(value, 42);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[trestle::test]
async fn test_await_event_fired_from_foreign_thread() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let worker = Arc::new(Mutex::new(None));
    let counter = cancelled.clone();
    let slot = worker.clone();

    let value = await_event(move |handler: EventHandler<u64>| {
        *slot.lock() = Some(thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            handler.fire(42);
            handler.fire(43);
        }));

        Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })
    .await
    .unwrap();

    let worker = worker.lock().take().unwrap();
    await_blocking(move || worker.join()).await.unwrap().unwrap();

    assert_eq!(value, 42);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[trestle::test]
async fn test_await_event_failure() {
    let err = await_event::<u8, _>(|handler| {
        handler.fail(BridgeError::operation("socket closed"));
        Subscription::empty()
    })
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "operation failed: socket closed");
}

#[trestle::test]
async fn test_periodic_timer_is_cancelled_after_first_tick() {
    let timers = Timers::current().unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let armed = Arc::new(Mutex::new(None));

    let registrar_timers = timers.clone();
    let counter = ticks.clone();
    let slot = armed.clone();

    let id = await_event(move |handler: EventHandler<TimerId>| {
        let id = registrar_timers.set_periodic(Duration::from_millis(5), move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            handler.fire(id);
        });

        *slot.lock() = Some(id);
        registrar_timers.subscription(id)
    })
    .await
    .unwrap();

    let expected = *armed.lock();
    assert_eq!(Some(id), expected);
    assert!(!timers.is_armed(id));

    sleep(Duration::from_millis(30)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}

#[trestle::test]
async fn test_cancel_timer_before_it_fires() {
    let timers = Timers::current().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let id = timers.set_timer(Duration::from_millis(10), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(timers.is_armed(id));
    assert!(timers.cancel_timer(id));
    assert!(!timers.cancel_timer(id));

    sleep(Duration::from_millis(30)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[trestle::test]
async fn test_cancel_timer_releases_handler() {
    let timers = Timers::current().unwrap();
    let captured = Arc::new(());
    let held = captured.clone();

    let id = timers.set_timer(Duration::from_secs(3600), move |_| {
        let _ = &held;
    });

    assert_eq!(Arc::strong_count(&captured), 2);
    assert!(timers.cancel_timer(id));
    assert_eq!(Arc::strong_count(&captured), 1);
}

#[trestle::test]
async fn test_one_shot_timer_disarms_after_firing() {
    let timers = Timers::current().unwrap();
    let origin = task::current_context();
    let setter = timers.clone();

    let (id, observed) = await_result(move |completion| {
        let completion = Mutex::new(Some(completion));

        setter.set_timer(Duration::from_millis(5), move |id| {
            if let Some(completion) = completion.lock().take() {
                let _ = completion.succeed((id, task::current_context()));
            }
        });
    })
    .await
    .unwrap();

    assert_eq!(observed, origin);
    assert!(!timers.is_armed(id));
    assert!(!timers.cancel_timer(id));
}

#[test]
fn test_timers_set_outside_contexts_run_on_first_context() {
    let runtime = RuntimeBuilder::new().contexts(2).build();
    let first = runtime.context(0).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = Mutex::new(tx);

    runtime.timers().set_timer(Duration::from_millis(5), move |_| {
        let _ = tx.lock().send(task::current_context());
    });

    let observed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(observed, Some(first));
}
