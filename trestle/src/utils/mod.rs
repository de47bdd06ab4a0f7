//! Small internal helpers.
//!
//! [`Slab`] keeps the per-context task registry, and [`panic_message`]
//! turns an unwind payload into something printable.

mod slab;

pub(crate) use slab::Slab;

use std::any::Any;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
