//! Ordered, synchronous publish/subscribe
//!
//! An [`Event`] keeps its listeners in registration order. Each registration
//! is a separate slot, so registering the same closure twice yields two
//! independently removable listeners.
//!
//! Firing takes a snapshot of the listener list before invoking anything, so
//! a listener that registers or disposes listeners (including itself) never
//! causes a delivery to be skipped or repeated within the same fire. A
//! listener that panics is isolated: the panic is logged and the remaining
//! listeners still receive the payload.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::disposable::Disposable;

type Listener<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

struct Registry<T> {
    next_slot: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// Outcome of a single [`Event::fire`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Listeners that returned normally
    pub delivered: usize,
    /// Listeners that panicked
    pub failed: usize,
}

impl FireReport {
    /// Total number of listeners invoked
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Ordered listener registry for payloads of type `T`
///
/// Every listener receives its own clone of the payload. Use an `Arc` payload
/// when all listeners should observe the same instance.
///
/// # Example
///
/// ```rust
/// use alerts_common::Event;
/// use std::sync::{Arc, Mutex};
///
/// let event: Event<u32> = Event::new("counter");
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let registration = event.register(move |value| sink.lock().unwrap().push(value));
///
/// event.fire(&1);
/// registration.dispose();
/// event.fire(&2);
///
/// assert_eq!(*seen.lock().unwrap(), vec![1]);
/// ```
pub struct Event<T> {
    owner: Arc<str>,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Event<T>
where
    T: Clone + 'static,
{
    /// Create an event; `owner` is only used in diagnostics
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: Arc::from(owner.into()),
            registry: Arc::new(Mutex::new(Registry {
                next_slot: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Append a listener, returning a handle that removes exactly this slot
    pub fn register<F>(&self, listener: F) -> Disposable
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let slot = {
            let mut registry = lock(&self.registry);
            let slot = registry.next_slot;
            registry.next_slot += 1;
            registry.listeners.push((slot, Arc::new(listener)));
            slot
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Disposable::from_action(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).listeners.retain(|(id, _)| *id != slot);
            }
        })
    }

    /// Deliver `payload` to a snapshot of the current listeners, in order
    pub fn fire(&self, payload: &T) -> FireReport {
        let snapshot: Vec<(u64, Listener<T>)> = lock(&self.registry)
            .listeners
            .iter()
            .map(|(slot, listener)| (*slot, Arc::clone(listener)))
            .collect();

        let mut report = FireReport::default();

        for (slot, listener) in snapshot {
            let value = payload.clone();
            match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    tracing::error!(
                        owner = %self.owner,
                        slot,
                        "Event listener panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        report
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    /// Diagnostic name of the owning component
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("owner", &self.owner)
            .field("listeners", &lock(&self.registry).listeners.len())
            .finish()
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
