//! Explicit subscriber lists with detachable handles.
//!
//! Both the watcher (`ContentChanged`) and the history store (`HistoryEvent`)
//! publish through a [`Subscribers`] registry. Callbacks run on the
//! publishing thread, outside of any registry lock.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::error;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<E>)>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<E> Detach for Mutex<Registry<E>> {
    fn detach(&self, id: u64) {
        let mut registry = self.lock().unwrap_or_else(PoisonError::into_inner);
        registry.callbacks.retain(|(cb_id, _)| *cb_id != id);
    }
}

pub struct Subscribers<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for Subscribers<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Subscribers<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(callback)));
        drop(registry);

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        let registry: Weak<dyn Detach> = weak;
        Subscription { id, registry }
    }

    /// Deliver `event` to every current subscriber. A panicking callback is
    /// logged and does not prevent delivery to the rest.
    pub fn publish(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = {
            let registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            registry.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("subscriber callback panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the callback registered.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unsubscribe_stops_delivery() {
        let subscribers = Subscribers::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let handle = subscribers.subscribe(move |n| {
            counter.fetch_add(*n as usize, Ordering::SeqCst);
        });

        subscribers.publish(&2);
        handle.unsubscribe();
        subscribers.publish(&5);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(subscribers.is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let subscribers = Subscribers::<()>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let _bad = subscribers.subscribe(|_| panic!("boom"));
        let counter = Arc::clone(&seen);
        let _good = subscribers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscribers.publish(&());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_noop() {
        let subscribers = Subscribers::<()>::new();
        let handle = subscribers.subscribe(|_| {});
        drop(subscribers);
        handle.unsubscribe();
    }
}
