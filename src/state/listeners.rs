use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tracing::error;

/// Callback invoked with every published value.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entries<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// Ordered set of listeners for one kind of event.
pub struct ListenerRegistry<T> {
    name: &'static str,
    entries: Arc<Mutex<Entries<T>>>,
}

impl<T: 'static> ListenerRegistry<T> {
    /// Create an empty registry; `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(Mutex::new(Entries {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register `listener`, replaying `current` to it first when present.
    pub fn subscribe(&self, listener: Listener<T>, current: Option<&T>) -> Subscription {
        if let Some(value) = current {
            invoke_guarded(self.name, listener.as_ref(), value);
        }

        let id = {
            let mut entries = self.lock();
            let id = entries.next_id;
            entries.next_id += 1;
            entries.listeners.push((id, listener));
            id
        };

        let weak: Weak<Mutex<Entries<T>>> = Arc::downgrade(&self.entries);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(entries) = weak.upgrade() {
                    let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
                    entries.listeners.retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Deliver `value` to every listener; a panicking listener does not stop the others.
    pub fn publish(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in &listeners {
            invoke_guarded(self.name, listener.as_ref(), value);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run a callback, logging instead of unwinding when it panics.
pub fn invoke_guarded<T: ?Sized>(registry: &str, listener: &(dyn Fn(&T) + Send + Sync), value: &T) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(value))) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".into());
        error!(registry, panic = %message, "listener panicked; continuing fan-out");
    }
}

/// Handle returned by `subscribe`; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Keep the listener registered for as long as its registry lives.
    pub fn detach(mut self) {
        self.cancel.take();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, Listener<u32>) {
        let count = Arc::new(AtomicUsize::new(0));
        let listener_count = count.clone();
        let listener: Listener<u32> = Arc::new(move |_| {
            listener_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn replays_current_value_on_subscribe() {
        let registry = ListenerRegistry::new("test");
        let (count, listener) = counter();
        let _subscription = registry.subscribe(listener, Some(&7));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let registry = ListenerRegistry::new("test");
        let (count, listener) = counter();
        let subscription = registry.subscribe(listener, None);
        registry.publish(&1);
        subscription.unsubscribe();
        registry.publish(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_break_fan_out() {
        let registry = ListenerRegistry::new("test");
        let _faulty = registry.subscribe(Arc::new(|_: &u32| panic!("boom")), None);
        let (count, listener) = counter();
        let _healthy = registry.subscribe(listener, None);

        registry.publish(&1);
        registry.publish(&2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let registry = ListenerRegistry::new("test");
        let (count, listener) = counter();
        registry.subscribe(listener, None).detach();
        registry.publish(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
