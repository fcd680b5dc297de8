//! Per-thread "current context" slot.
//!
//! Each OS thread has at most one current context, and each context is
//! current on at most one thread. The thread side lives in a thread-local;
//! the context side is an owner record shared between the context and the
//! thread-local entry, so making another context current on a thread can
//! release the previous one.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::backend::DeviceBackend;
use crate::error::StateError;

use super::ContextId;

/// The thread a context is current on, if any.
pub(crate) type OwnerRecord = Arc<Mutex<Option<ThreadId>>>;

struct CurrentEntry {
    context: ContextId,
    owner: OwnerRecord,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentEntry>> = const { RefCell::new(None) };
}

/// The context current on the calling thread, if any.
pub fn current_context() -> Option<ContextId> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .filter(|entry| *entry.owner.lock() == Some(thread::current().id()))
            .map(|entry| entry.context)
    })
}

pub(crate) fn is_current(context: ContextId, owner: &OwnerRecord) -> bool {
    *owner.lock() == Some(thread::current().id())
        && CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .is_some_and(|entry| entry.context == context)
        })
}

pub(crate) fn make_current(
    context: ContextId,
    owner: &OwnerRecord,
    backend: &dyn DeviceBackend,
) -> Result<(), StateError> {
    let me = thread::current().id();
    {
        let mut owner_thread = owner.lock();
        match *owner_thread {
            Some(thread) if thread != me => {
                return Err(StateError::InvalidOperation(format!(
                    "context {context} is current on another thread"
                )));
            }
            Some(_) if is_current_entry(context) => return Ok(()),
            _ => *owner_thread = Some(me),
        }
    }

    CURRENT.with(|current| {
        let previous = current.borrow_mut().replace(CurrentEntry {
            context,
            owner: Arc::clone(owner),
        });
        if let Some(previous) = previous
            && previous.context != context
        {
            *previous.owner.lock() = None;
            log::trace!("context {} released by {context}", previous.context);
        }
    });

    backend.make_current(Some(context));
    Ok(())
}

pub(crate) fn release_current(
    context: ContextId,
    owner: &OwnerRecord,
    backend: &dyn DeviceBackend,
) -> Result<(), StateError> {
    if !is_current(context, owner) {
        return Err(StateError::InvalidOperation(format!(
            "context {context} is not current on this thread"
        )));
    }

    CURRENT.with(|current| current.borrow_mut().take());
    *owner.lock() = None;
    backend.make_current(None);
    Ok(())
}

/// Forget `context` on the calling thread without a device call.
pub(crate) fn forget(context: ContextId, owner: &OwnerRecord) {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        if current.as_ref().is_some_and(|entry| entry.context == context) {
            current.take();
        }
    });
    *owner.lock() = None;
}

fn is_current_entry(context: ContextId) -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|entry| entry.context == context)
    })
}
