//! Fan-out of one notification interface to many observers.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Opaque registration handle returned by [`CompositeListener::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

/// Ordered set of observers delivering in reverse registration order.
///
/// The last registered observer is notified first. Delivery iterates over a
/// copy of the registration list, so observers added or removed while a
/// notification is being delivered only affect the next notification.
///
/// A panicking observer is logged and skipped; the remaining observers still
/// receive the notification.
///
/// # Example
///
/// ```rust
/// use chorus::listener::CompositeListener;
/// use std::sync::{Arc, Mutex};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self, out: &Mutex<Vec<&'static str>>);
/// }
///
/// struct Named(&'static str);
///
/// impl Greeter for Named {
///     fn greet(&self, out: &Mutex<Vec<&'static str>>) {
///         out.lock().unwrap().push(self.0);
///     }
/// }
///
/// let composite: CompositeListener<dyn Greeter> = CompositeListener::new();
/// composite.register(Arc::new(Named("first")));
/// composite.register(Arc::new(Named("second")));
///
/// let out = Mutex::new(Vec::new());
/// composite.for_each(|g| g.greet(&out));
/// assert_eq!(*out.lock().unwrap(), vec!["second", "first"]);
/// ```
pub struct CompositeListener<L: ?Sized> {
    entries: RwLock<Vec<(ListenerHandle, Arc<L>)>>,
    next_handle: AtomicU64,
}

impl<L: ?Sized> CompositeListener<L> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    pub fn register(&self, listener: Arc<L>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, listener));
        handle
    }

    /// Remove a registration. Returns `false` if the handle is unknown.
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(h, _)| *h != handle);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `notify` on every observer, newest first.
    pub fn for_each<F>(&self, notify: F)
    where
        F: Fn(&L),
    {
        let snapshot: Vec<(ListenerHandle, Arc<L>)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (handle, listener) in snapshot.iter().rev() {
            let delivered = catch_unwind(AssertUnwindSafe(|| notify(&**listener)));
            if delivered.is_err() {
                warn!(listener = handle.0, "listener panicked during notification");
            }
        }
    }
}

impl<L: ?Sized> Default for CompositeListener<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for CompositeListener<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeListener")
            .field("listeners", &self.len())
            .finish()
    }
}
