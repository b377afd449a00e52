//! Listener bookkeeping and disposable subscriptions.
//!
//! A [`ListenerRegistry`] keys registrations by listener identity, that is
//! the address of the shared listener, so one listener instance holds at
//! most one active registration at a time. Every successful registration
//! yields a [`Subscription`] scoped to that exact registration: disposing an
//! old handle never removes a newer registration of the same listener.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// One activation of a listener in a registry.
pub struct Registration<L: ?Sized> {
    listener: Arc<L>,
    active: AtomicBool,
}

impl<L: ?Sized> Registration<L> {
    /// Returns the registered listener.
    #[must_use]
    pub const fn listener(&self) -> &Arc<L> {
        &self.listener
    }

    /// Returns whether the registration has not been deactivated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

impl<L: ?Sized> fmt::Debug for Registration<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Concurrent registry of listener registrations.
pub struct ListenerRegistry<L: ?Sized> {
    registrations: RwLock<HashMap<usize, Arc<Registration<L>>>>,
}

impl<L: ?Sized + Send + Sync + 'static> ListenerRegistry<L> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a listener.
    ///
    /// Returns `None` when the same listener instance is already registered.
    #[must_use]
    pub fn add(&self, listener: Arc<L>) -> Option<Arc<Registration<L>>> {
        let key = identity(&*listener);
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if registrations.contains_key(&key) {
            return None;
        }
        let registration = Arc::new(Registration {
            listener,
            active: AtomicBool::new(true),
        });
        registrations.insert(key, Arc::clone(&registration));
        Some(registration)
    }

    /// Deactivates the current registration of a listener.
    ///
    /// Returns whether a registration was removed.
    pub fn remove(&self, listener: &L) -> bool {
        let removed = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identity(listener));
        if let Some(registration) = &removed {
            registration.deactivate();
        }
        removed.is_some()
    }

    /// Deactivates exactly this registration.
    ///
    /// The registry entry is removed only when it still refers to this
    /// registration; a newer registration of the same listener is kept.
    pub fn remove_registration(&self, registration: &Arc<Registration<L>>) -> bool {
        let deactivated = registration.deactivate();
        let key = identity(&*registration.listener);
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let is_current = registrations
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, registration));
        if is_current {
            registrations.remove(&key);
        }
        deactivated && is_current
    }

    /// Returns whether the registration is active and still the current
    /// registration of its listener.
    #[must_use]
    pub fn is_valid(&self, registration: &Arc<Registration<L>>) -> bool {
        registration.is_active()
            && self
                .registrations
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&identity(&*registration.listener))
                .is_some_and(|current| Arc::ptr_eq(current, registration))
    }

    /// Returns the active registrations.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Registration<L>>> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|registration| registration.is_active())
            .cloned()
            .collect()
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issues a subscription that disposes exactly `registration`.
    #[must_use]
    pub fn subscription_of(self: &Arc<Self>, registration: &Arc<Registration<L>>) -> Subscription {
        Subscription::live(RegistryHandle {
            registry: Arc::downgrade(self),
            registration: Arc::downgrade(registration),
        })
    }
}

impl<L: ?Sized + Send + Sync + 'static> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ListenerRegistry")
            .field("registrations", &count)
            .finish()
    }
}

fn identity<L: ?Sized>(listener: &L) -> usize {
    std::ptr::from_ref(listener).cast::<()>().addr()
}

trait Unregister: Send + Sync {
    fn unregister(&self);
}

struct RegistryHandle<L: ?Sized> {
    registry: Weak<ListenerRegistry<L>>,
    registration: Weak<Registration<L>>,
}

impl<L: ?Sized + Send + Sync + 'static> Unregister for RegistryHandle<L> {
    fn unregister(&self) {
        let Some(registration) = self.registration.upgrade() else {
            return;
        };
        self.registry.upgrade().map_or_else(
            || registration.deactivate(),
            |registry| registry.remove_registration(&registration),
        );
    }
}

/// Disposable handle to one registration.
///
/// Dropping a subscription does not dispose it. `dispose` is idempotent.
pub struct Subscription {
    handle: Option<Box<dyn Unregister>>,
    disposed: AtomicBool,
}

impl Subscription {
    fn live(handle: impl Unregister + 'static) -> Self {
        Self {
            handle: Some(Box::new(handle)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns an inert, already disposed subscription.
    #[must_use]
    pub const fn disposed() -> Self {
        Self {
            handle: None,
            disposed: AtomicBool::new(true),
        }
    }

    /// Deactivates the registration this subscription was issued for.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = &self.handle {
            handle.unregister();
        }
    }

    /// Returns whether `dispose` was called or the subscription is inert.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Collection of subscriptions disposed together.
#[derive(Debug, Default)]
pub struct SubscriptionBag {
    subscriptions: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl SubscriptionBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription. A closed bag disposes it immediately.
    pub fn add(&self, subscription: Subscription) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_disposed() {
            drop(subscriptions);
            subscription.dispose();
            return;
        }
        subscriptions.push(subscription);
    }

    /// Disposes every held subscription and keeps the bag usable.
    pub fn clear(&self) {
        let drained = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in &drained {
            subscription.dispose();
        }
    }

    /// Disposes every held subscription and closes the bag.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear();
    }

    /// Returns whether the bag was closed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns the number of held subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether the bag holds no subscription.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
