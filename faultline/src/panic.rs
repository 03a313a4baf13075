//! Turning panics into rich errors.
//!
//! A stack taken after `catch_unwind` returns no longer contains the
//! panicking frames. [`install_hook`] adds a panic hook that captures the
//! stack while the panic is still being dispatched, and [`catch`] picks it
//! up, so the resulting [`RichError`] points at the code that panicked and
//! the default [`PanicDetector`](crate::detect::PanicDetector) recognises it.
//!
//! The hook only captures on threads currently inside [`catch`].

use crate::error::RichError;
use crate::stack::{self, StackModel};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, UnwindSafe};
use std::sync::Once;
use tracing::{debug, warn};

enum Slot {
    Idle,
    Armed,
    Captured(StackModel),
}

thread_local! {
    static SLOT: RefCell<Slot> = const { RefCell::new(Slot::Idle) };
}

static HOOK: Once = Once::new();

/// Install the capturing panic hook. The previous hook still runs after it.
///
/// Idempotent; only the first call installs anything.
pub fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            record_unwind();
            previous(info);
        }));
        debug!("panic capture hook installed");
    });
}

fn record_unwind() {
    let armed = SLOT.with(|slot| matches!(*slot.borrow(), Slot::Armed));
    if !armed {
        return;
    }
    match stack::try_capture(0) {
        Ok(stack) => SLOT.with(|slot| *slot.borrow_mut() = Slot::Captured(stack)),
        Err(err) => warn!(%err, "could not capture the unwinding stack"),
    }
}

/// Run `f`, turning a panic into a [`RichError`] of kind
/// [`RichKind::Panic`](crate::error::RichKind::Panic).
///
/// The stack is the one recorded by the hook when it is installed, or one
/// captured after the unwind otherwise.
///
/// # Errors
///
/// Returns the panic as an error.
#[track_caller]
pub fn catch<F, T>(f: F) -> Result<T, RichError>
where
    F: FnOnce() -> T + UnwindSafe,
{
    let outer = SLOT.with(|slot| slot.replace(Slot::Armed));
    let result = panic::catch_unwind(f);
    let recorded = SLOT.with(|slot| slot.replace(outer));

    let payload = match result {
        Ok(value) => return Ok(value),
        Err(payload) => payload,
    };
    let message = payload_message(payload.as_ref());
    let stack = match recorded {
        Slot::Captured(stack) => stack,
        Slot::Idle | Slot::Armed => {
            debug!("no stack recorded during unwind, capturing after it");
            stack::capture(0)
        }
    };
    Err(RichError::from_panic(message, stack))
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
