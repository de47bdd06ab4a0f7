use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use trestle::bridge::{Continuation, await_result, suspend};
use trestle::{ContextId, RuntimeBuilder, task};

fn thread_name() -> Option<String> {
    thread::current().name().map(str::to_owned)
}

#[test]
fn test_resumes_on_origin_context() {
    let runtime = RuntimeBuilder::new().contexts(3).build();
    let target = runtime.context(2).unwrap();

    let handle = runtime
        .launch(target, async move {
            let before = (task::current_context(), thread_name());

            let value = await_result(|completion| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(10));
                    let _ = completion.succeed(9);
                });
            })
            .await
            .unwrap();

            let after = (task::current_context(), thread_name());
            (before, after, value)
        })
        .unwrap();

    let (before, after, value) = runtime.block_on(handle).unwrap();

    assert_eq!(value, 9);
    assert_eq!(before.0, Some(target));
    assert_eq!(after, before);
    assert_eq!(after.1.as_deref(), Some("trestle-context-2"));
}

#[test]
fn test_context_threads_use_configured_name() {
    let runtime = RuntimeBuilder::new()
        .contexts(2)
        .thread_name("bridge")
        .build();

    let target = runtime.context(1).unwrap();
    let name = runtime.block_on_context(target, async { thread_name() });

    assert_eq!(name.as_deref(), Some("bridge-1"));
    assert_eq!(target.to_string(), "context-1");
}

#[test]
fn test_dispatch_runs_work_in_order_on_target_context() {
    let runtime = RuntimeBuilder::new().contexts(2).build();
    let target = runtime.context(1).unwrap();
    let dispatcher = runtime.dispatcher(target).unwrap();

    assert_eq!(dispatcher.context_id(), target);

    let (tx, rx) = mpsc::channel();
    for i in 0..5 {
        let tx = tx.clone();
        dispatcher
            .dispatch(move || {
                let _ = tx.send((i, task::current_context()));
            })
            .unwrap();
    }

    let received: Vec<(usize, Option<ContextId>)> = (0..5)
        .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
        .collect();

    let expected: Vec<(usize, Option<ContextId>)> = (0..5).map(|i| (i, Some(target))).collect();
    assert_eq!(received, expected);
}

#[test]
fn test_dispatcher_launch_binds_task_to_its_context() {
    let runtime = RuntimeBuilder::new().contexts(2).build();
    let target = runtime.context(1).unwrap();
    let dispatcher = runtime.dispatcher(target).unwrap();

    let handle = dispatcher.launch(async { task::current_context() });
    assert_eq!(handle.context(), target);

    assert_eq!(runtime.block_on(handle).unwrap(), Some(target));
}

#[trestle::test(contexts = 2)]
async fn test_dispatcher_resume_from_foreign_thread() {
    let dispatcher = trestle::current_dispatcher().unwrap();
    let origin = task::current_context();

    let value = suspend(move |continuation: Continuation<&'static str>| {
        thread::spawn(move || {
            dispatcher.resume(&continuation, Ok("done")).unwrap();
        });
    })
    .await
    .unwrap();

    assert_eq!(value, "done");
    assert_eq!(task::current_context(), origin);
}

#[trestle::test(contexts = 2)]
async fn test_launched_task_resumes_on_its_own_context() {
    let current = trestle::current_dispatcher().unwrap().context_id();

    let handle = task::launch(async {
        let origin = task::current_context();

        for _ in 0..3 {
            await_result(|completion| {
                thread::spawn(move || {
                    let _ = completion.succeed(());
                });
            })
            .await
            .unwrap();

            assert_eq!(task::current_context(), origin);
        }

        origin
    });

    assert_eq!(handle.await.unwrap(), Some(current));
}

#[test]
fn test_outside_contexts_have_no_current_context() {
    assert!(task::current_context().is_none());
    assert!(trestle::current_dispatcher().is_none());
}
