use super::core::Task;

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Builds a [`Waker`] that re-enqueues `task` on the context it is bound to.
///
/// The waker may be cloned and woken from any thread: the reactor thread,
/// a blocking helper thread, or another execution context. The poll itself
/// always happens on the owning context.
///
/// # Safety
///
/// The data pointer stored in the `RawWaker` comes from `Arc::into_raw` and
/// every vtable entry keeps the strong count balanced.
pub(crate) fn make_waker<T: Send + 'static>(task: Arc<Task<T>>) -> Waker {
    let raw = RawWaker::new(Arc::into_raw(task).cast::<()>(), vtable::<T>());

    unsafe { Waker::from_raw(raw) }
}

fn vtable<T: Send + 'static>() -> &'static RawWakerVTable {
    &RawWakerVTable::new(clone::<T>, wake::<T>, wake_by_ref::<T>, drop::<T>)
}

/// Borrows the task behind `ptr` without touching its strong count.
///
/// # Safety
///
/// `ptr` must come from `Arc::<Task<T>>::into_raw` and still be live.
unsafe fn borrow<T>(ptr: *const ()) -> ManuallyDrop<Arc<Task<T>>> {
    ManuallyDrop::new(unsafe { Arc::from_raw(ptr.cast::<Task<T>>()) })
}

fn clone<T: Send + 'static>(ptr: *const ()) -> RawWaker {
    let task = unsafe { borrow::<T>(ptr) };
    let cloned = Arc::clone(&task);

    RawWaker::new(Arc::into_raw(cloned).cast::<()>(), vtable::<T>())
}

/// Consumes the waker's reference.
fn wake<T: Send + 'static>(ptr: *const ()) {
    let task = unsafe { Arc::<Task<T>>::from_raw(ptr.cast::<Task<T>>()) };
    task.wake();
}

fn wake_by_ref<T: Send + 'static>(ptr: *const ()) {
    let task = unsafe { borrow::<T>(ptr) };
    Arc::clone(&task).wake();
}

fn drop<T: Send + 'static>(ptr: *const ()) {
    unsafe { Arc::<Task<T>>::decrement_strong_count(ptr.cast::<Task<T>>()) };
}
