//! Renewal-outcome delivery to the host callback.
//!
//! One slot per client instance (not process-wide: every
//! [`FloatingClient`](crate::FloatingClient) owns its own dispatcher, so
//! instances in tests never collide). The callback is invoked with no
//! internal lock held; the host may legally re-enter the client from
//! inside it, e.g. call `drop_floating_license()` on a fatal status.

use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::status::StatusCode;

/// Host callback receiving the terminal status of each renewal attempt.
pub type FloatingLicenseCallback = Arc<dyn Fn(StatusCode) + Send + Sync + 'static>;

/// Holds at most one registered host callback.
#[derive(Default)]
pub struct CallbackDispatcher {
    slot: Mutex<Option<FloatingLicenseCallback>>,
}

impl CallbackDispatcher {
    /// New dispatcher with an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, silently replacing any previous one.
    pub fn register(&self, callback: impl Fn(StatusCode) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.slot.lock() {
            let replaced = slot.replace(Arc::new(callback)).is_some();
            debug!(replaced, "callback registered");
        }
    }

    /// Remove the registered callback, if any.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }

    /// Check whether a callback is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Deliver a terminal renewal status to the registered callback.
    ///
    /// The slot lock is released before the call, so the callback may
    /// re-enter the dispatcher (or the lease manager) freely.
    pub fn dispatch(&self, status: StatusCode) {
        let callback = self
            .slot
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(Arc::clone));
        match callback {
            Some(callback) => {
                debug!(status = %status, "dispatching renewal status to host callback");
                callback(status);
            },
            None => trace!(status = %status, "no callback registered, renewal status dropped"),
        }
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_replaces_silently() {
        let dispatcher = CallbackDispatcher::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let hits = Arc::clone(&first);
        dispatcher.register(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let hits = Arc::clone(&second);
        dispatcher.register(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(StatusCode::Ok);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_without_callback_is_noop() {
        let dispatcher = CallbackDispatcher::new();
        dispatcher.dispatch(StatusCode::NetworkError);
        assert!(!dispatcher.is_registered());
    }

    #[test]
    fn test_callback_may_reenter_dispatcher() {
        let dispatcher = Arc::new(CallbackDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register(move |_| {
            // Re-entering must not deadlock: the slot lock is released
            // before invocation.
            inner.clear();
        });
        dispatcher.dispatch(StatusCode::Ok);
        assert!(!dispatcher.is_registered());
    }

    #[test]
    fn test_clear_removes_callback() {
        let dispatcher = CallbackDispatcher::new();
        dispatcher.register(|_| {});
        assert!(dispatcher.is_registered());
        dispatcher.clear();
        assert!(!dispatcher.is_registered());
    }
}
