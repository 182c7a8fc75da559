//! Observer entries, notification, and teardown.
//!
//! A provider owns the observer entries of each registration; a consumer
//! only holds a [`Subscription`] back-reference that knows how to remove its
//! own entry again.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::id::{Context, ContextId};
use super::registry::{LifecycleKind, Lookup, Provided};
use crate::tree::{Node, WeakNode};

/// Callback invoked with each delivered value.
pub(crate) type Callback<T> = Rc<dyn Fn(&T)>;

/// Unique identifier for an observer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// An observer stored on a provider registration.
pub(crate) struct ObserverEntry<T> {
    pub(crate) id: ObserverId,
    pub(crate) consumer: WeakNode,
    pub(crate) callback: Callback<T>,
    /// Removed right before its single delivery.
    pub(crate) once: bool,
}

impl<T> Clone for ObserverEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            consumer: self.consumer.clone(),
            callback: Rc::clone(&self.callback),
            once: self.once,
        }
    }
}

/// The consumer-side handle of an established subscription.
///
/// Holding it does not keep the provider alive. Unsubscribing after the
/// provider or its registration is gone is a no-op.
#[derive(Clone)]
pub struct Subscription {
    provider: WeakNode,
    context: ContextId,
    observer: ObserverId,
    detach: fn(&Node, &ContextId, ObserverId),
}

impl Subscription {
    pub(crate) fn new<T: 'static>(provider: &Node, context: &ContextId, observer: ObserverId) -> Self {
        Self {
            provider: provider.downgrade(),
            context: context.clone(),
            observer,
            detach: remove_observer::<T>,
        }
    }

    /// The provider this subscription is attached to, if it still exists.
    pub fn provider(&self) -> Option<Node> {
        self.provider.upgrade()
    }

    /// The observed context.
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// The observer entry on the provider.
    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    /// Remove the observer entry from the provider.
    pub fn unsubscribe(&self) {
        if let Some(provider) = self.provider.upgrade() {
            (self.detach)(&provider, &self.context, self.observer);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("provider", &self.provider)
            .field("context", &self.context)
            .field("observer", &self.observer)
            .finish()
    }
}

/// Remove one observer entry and fire `unobserve` listeners.
///
/// Does nothing if the entry is already gone, so repeated teardown never
/// fires listeners twice.
pub(crate) fn remove_observer<T: 'static>(provider: &Node, context: &ContextId, observer: ObserverId) {
    let Lookup::Found(provided) = provider.lookup::<T>(context) else {
        return;
    };
    if let Some(count) = provided.remove_observer(observer) {
        tracing::debug!(
            context = %context,
            provider = provider.label(),
            observers = count,
            "observer removed"
        );
        provided.run_listeners(provider, LifecycleKind::Unobserve, count);
    }
}

/// Deliver the provider's current value to every observer.
///
/// Iterates over a snapshot taken before the first delivery. Entries
/// removed by an earlier callback are skipped; entries added during the
/// pass already received their initial value and are not visited.
pub(crate) fn notify_observers<T: 'static>(provider: &Node, context: &ContextId, provided: &Provided<T>) {
    let Some(value) = provided.current_value(provider) else {
        tracing::trace!(context = %context, provider = provider.label(), "no value yet; update suppressed");
        return;
    };

    let snapshot = provided.snapshot();
    tracing::debug!(
        context = %context,
        provider = provider.label(),
        observers = snapshot.len(),
        "notifying observers"
    );

    for entry in snapshot {
        if !provided.contains(entry.id) {
            continue;
        }
        let Some(consumer) = entry.consumer.upgrade() else {
            remove_observer::<T>(provider, context, entry.id);
            continue;
        };
        if entry.once {
            remove_observer::<T>(provider, context, entry.id);
        }
        tracing::trace!(context = %context, consumer = consumer.label(), once = entry.once, "delivering value");
        (entry.callback)(&value);
    }
}

impl Node {
    /// Stop observing a context.
    ///
    /// Removes the observer entry from the resolved provider (firing its
    /// `unobserve` listeners) or, if the context never resolved, drops the
    /// pending orphan record. Calling it again is a no-op.
    pub fn unobserve_context<T>(&self, context: &Context<T>) {
        self.unobserve_id(context.id());
    }

    pub(crate) fn unobserve_id(&self, context: &ContextId) {
        let subscription = self.inner.providers.borrow_mut().remove(context);
        if let Some(subscription) = subscription {
            tracing::debug!(context = %context, consumer = self.label(), "unobserving context");
            subscription.unsubscribe();
        }
        if self.runtime().remove_orphan(context, self.id()) {
            tracing::debug!(context = %context, consumer = self.label(), "orphan withdrawn");
        }
    }

    /// Check whether this node holds a resolved subscription to a context.
    pub fn is_observing<T>(&self, context: &Context<T>) -> bool {
        self.inner.providers.borrow().contains_key(context.id())
    }

    /// The provider this node's subscription to a context resolved to.
    pub fn provider_of<T>(&self, context: &Context<T>) -> Option<Node> {
        self.subscription(context.id())
            .and_then(|subscription| subscription.provider())
    }

    pub(crate) fn subscription(&self, context: &ContextId) -> Option<Subscription> {
        self.inner.providers.borrow().get(context).cloned()
    }

    pub(crate) fn set_subscription(&self, subscription: Subscription) {
        self.inner
            .providers
            .borrow_mut()
            .insert(subscription.context.clone(), subscription);
    }

    /// Drop the back-reference only if it still points at `observer`.
    pub(crate) fn clear_subscription(&self, context: &ContextId, observer: ObserverId) {
        let mut providers = self.inner.providers.borrow_mut();
        if providers.get(context).map(|s| s.observer) == Some(observer) {
            providers.remove(context);
        }
    }
}
