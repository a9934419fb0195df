//! Handler registries for push notifications and state changes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// A set of handlers invoked, in registration order, for every emitted value.
pub(crate) struct Subscribers<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 1,
                handlers: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut reg = self.inner.lock();
            let id = reg.next_id;
            reg.next_id += 1;
            reg.handlers.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().handlers.retain(|(hid, _)| *hid != id);
                }
            })),
        }
    }

    /// Call every handler with `value`.  Handlers run outside the registry
    /// lock, so they may subscribe or unsubscribe; a panicking handler is
    /// logged and does not stop the others.
    pub fn emit(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .inner
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
                tracing::error!("subscriber handler panicked");
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }
}

/// Registration handle returned by `on_notification` / `on_state_change`.
///
/// Dropping it leaves the handler registered; call [`unsubscribe`](Self::unsubscribe)
/// to remove it.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to call unsubscribe()"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_handler_sees_every_value() {
        let subs: Subscribers<u32> = Subscribers::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = total.clone();
        let _a = subs.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = total.clone();
        let _b = subs.subscribe(move |v| {
            t2.fetch_add(*v as usize * 10, Ordering::SeqCst);
        });

        subs.emit(&1);
        subs.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 33);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let subs: Subscribers<u32> = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let first = subs.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        let _second = subs.subscribe(move |_| {
            h2.fetch_add(100, Ordering::SeqCst);
        });

        first.unsubscribe();
        assert_eq!(subs.len(), 1);
        subs.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let subs: Subscribers<u32> = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = subs.subscribe(|_| panic!("boom"));
        let h = hits.clone();
        let _good = subs.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        subs.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_harmless() {
        let subs: Subscribers<u32> = Subscribers::new();
        let sub = subs.subscribe(|_| {});
        drop(subs);
        sub.unsubscribe();
    }
}
