//! Explicit, idempotent resource teardown
//!
//! A [`Disposable`] wraps a teardown action that runs at most once, no matter
//! how many clones of the handle call [`Disposable::dispose`] or from which
//! thread. Components hold disposables for the resources they own and tear
//! them down in a fixed order with [`Disposable::composite`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a resource that can be torn down exactly once
///
/// Cloning a `Disposable` produces another handle to the same resource.
/// Dropping a handle does nothing; teardown only happens through `dispose()`.
///
/// # Example
///
/// ```rust
/// use alerts_common::Disposable;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let handle = Disposable::from_action(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// handle.dispose();
/// handle.dispose();
///
/// assert!(handle.is_disposed());
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<Inner>,
}

struct Inner {
    claimed: AtomicBool,
    disposed: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

impl Disposable {
    /// Wrap a zero-argument action as the teardown of a new resource
    pub fn from_action<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_teardown(Some(Box::new(action)))
    }

    /// A resource with nothing to tear down
    pub fn empty() -> Self {
        Self::with_teardown(None)
    }

    /// Combine several disposables into one, disposed in the given order
    pub fn composite(members: Vec<Disposable>) -> Self {
        Self::from_action(move || {
            for member in members {
                member.dispose();
            }
        })
    }

    fn with_teardown(teardown: Option<Teardown>) -> Self {
        Self {
            inner: Arc::new(Inner {
                claimed: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                teardown: Mutex::new(teardown),
            }),
        }
    }

    /// Tear the resource down
    ///
    /// Only the first call runs the teardown action; the disposed flag is set
    /// once it returns. Later calls, including concurrent ones, are no-ops.
    /// A panicking teardown propagates to the caller and is not retried, but
    /// the resource still counts as disposed.
    pub fn dispose(&self) {
        if self.inner.claimed.swap(true, Ordering::AcqRel) {
            return;
        }

        let teardown = self
            .inner
            .teardown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let _done = MarkDisposed(&self.inner.disposed);

        // The lock is released so the teardown may dispose other handles,
        // including clones of this one.
        if let Some(action) = teardown {
            action();
        }
    }

    /// Whether `dispose()` has run to completion or unwound
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same resource
    pub fn ptr_eq(&self, other: &Disposable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Sets the disposed flag when dropped, also while unwinding
struct MarkDisposed<'a>(&'a AtomicBool);

impl Drop for MarkDisposed<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
