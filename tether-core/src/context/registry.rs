//! Provider Registry
//!
//! Each node owns at most one registration per context. A registration
//! holds the value source, the ordered observer entries, and the lifecycle
//! listeners fired whenever the observer count changes.
//!
//! # Value sources
//!
//! A value source is a payload plus a getter `(provider, &payload) -> Option<T>`.
//! The plain `register_context` form stores the value itself as payload and
//! clones it out. A getter returning `None` means "no value yet": discovery
//! still completes the subscription but delivers nothing until a later
//! update produces a value.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use super::id::{Context, ContextId};
use super::subscription::{notify_observers, Callback, ObserverEntry, ObserverId, Subscription};
use crate::error::{ContextError, Result};
use crate::tree::Node;

type Getter<T> = Rc<dyn Fn(&Node, &dyn Any) -> Option<T>>;

/// Listener callback, invoked with the provider and the current observer count.
pub(crate) type ListenerFn = Rc<dyn Fn(&Node, usize)>;

/// Which observer-count change a lifecycle listener reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    /// An observer was added.
    Observe,
    /// An observer was removed.
    Unobserve,
}

struct LifecycleListener {
    kind: LifecycleKind,
    callback: ListenerFn,
}

struct ValueSource<T> {
    payload: Rc<dyn Any>,
    payload_type: TypeId,
    getter: Getter<T>,
}

impl<T: 'static> ValueSource<T> {
    fn new<P, G>(payload: P, getter: G) -> Self
    where
        P: 'static,
        G: Fn(&Node, &P) -> Option<T> + 'static,
    {
        Self {
            payload: Rc::new(payload),
            payload_type: TypeId::of::<P>(),
            getter: Rc::new(move |provider: &Node, payload: &dyn Any| {
                payload
                    .downcast_ref::<P>()
                    .and_then(|payload| getter(provider, payload))
            }),
        }
    }
}

/// A single context registration on a provider node.
pub(crate) struct Provided<T> {
    source: RefCell<ValueSource<T>>,
    observers: RefCell<Vec<ObserverEntry<T>>>,
    listeners: RefCell<Vec<LifecycleListener>>,
}

/// Result of looking up a registration with a given value type.
pub(crate) enum Lookup<T> {
    Found(Rc<Provided<T>>),
    Missing,
    WrongType,
}

/// A discovery request arriving at a provider.
pub(crate) struct ContextRequest<T> {
    pub(crate) callback: Callback<T>,
    /// `false` for one-shot reads.
    pub(crate) subscribe: bool,
}

impl<T: 'static> Provided<T> {
    fn new(source: ValueSource<T>) -> Self {
        Self {
            source: RefCell::new(source),
            observers: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Evaluate the value source. No borrow is held while the getter runs.
    pub(crate) fn current_value(&self, provider: &Node) -> Option<T> {
        let (getter, payload) = {
            let source = self.source.borrow();
            (Rc::clone(&source.getter), Rc::clone(&source.payload))
        };
        getter(provider, &*payload)
    }

    fn replace_source(&self, source: ValueSource<T>) {
        *self.source.borrow_mut() = source;
    }

    fn set_payload<P: 'static>(&self, payload: P) -> bool {
        let mut source = self.source.borrow_mut();
        if source.payload_type != TypeId::of::<P>() {
            return false;
        }
        source.payload = Rc::new(payload);
        true
    }

    /// Handle a discovery request that reached this provider.
    ///
    /// Subscribing requests (and one-shot reads while no value exists yet)
    /// leave an observer entry behind. The consumer's back-reference is
    /// stored before the first delivery so the callback may already tear
    /// the subscription down.
    pub(crate) fn intercept(&self, provider: &Node, consumer: &Node, context: &ContextId, request: ContextRequest<T>) {
        let value = self.current_value(provider);

        if !request.subscribe {
            if let Some(value) = value {
                tracing::trace!(context = %context, consumer = consumer.label(), "one-shot read answered");
                (request.callback)(&value);
                return;
            }
        }

        let observer = ObserverId::new();
        let count = {
            let mut observers = self.observers.borrow_mut();
            observers.push(ObserverEntry {
                id: observer,
                consumer: consumer.downgrade(),
                callback: Rc::clone(&request.callback),
                once: !request.subscribe,
            });
            observers.len()
        };
        tracing::debug!(
            context = %context,
            provider = provider.label(),
            consumer = consumer.label(),
            observers = count,
            pending = value.is_none(),
            "observer added"
        );

        if request.subscribe {
            consumer.set_subscription(Subscription::new::<T>(provider, context, observer));
        }
        if let Some(value) = value {
            (request.callback)(&value);
        }
        let count = self.observer_count();
        self.run_listeners(provider, LifecycleKind::Observe, count);
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    pub(crate) fn contains(&self, observer: ObserverId) -> bool {
        self.observers.borrow().iter().any(|entry| entry.id == observer)
    }

    pub(crate) fn snapshot(&self) -> Vec<ObserverEntry<T>> {
        self.observers.borrow().clone()
    }

    /// Remove an entry; returns the remaining count if it was present.
    pub(crate) fn remove_observer(&self, observer: ObserverId) -> Option<usize> {
        let mut observers = self.observers.borrow_mut();
        let index = observers.iter().position(|entry| entry.id == observer)?;
        observers.remove(index);
        Some(observers.len())
    }

    /// Swap the callback of an existing entry in place.
    pub(crate) fn replace_callback(&self, observer: ObserverId, callback: Callback<T>) -> bool {
        let mut observers = self.observers.borrow_mut();
        match observers.iter_mut().find(|entry| entry.id == observer) {
            Some(entry) => {
                entry.callback = callback;
                true
            }
            None => false,
        }
    }

    fn take_observers(&self) -> Vec<ObserverEntry<T>> {
        std::mem::take(&mut *self.observers.borrow_mut())
    }

    pub(crate) fn add_listener(&self, kind: LifecycleKind, callback: ListenerFn) {
        self.listeners
            .borrow_mut()
            .push(LifecycleListener { kind, callback });
    }

    pub(crate) fn run_listeners(&self, provider: &Node, kind: LifecycleKind, count: usize) {
        let listeners: SmallVec<[ListenerFn; 4]> = self
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| Rc::clone(&listener.callback))
            .collect();
        for listener in listeners {
            listener(provider, count);
        }
    }
}

/// A registration as stored on the provider node, with its value type erased.
pub(crate) struct Registration {
    provided: Rc<dyn Any>,
    withdraw: fn(&Node, &ContextId, Rc<dyn Any>) -> usize,
}

/// Detach every observer of a removed registration and send it back
/// through discovery. Returns the number of observers detached.
///
/// `unobserve` listeners fire once with a count of zero. Subscribed
/// consumers resolve to a farther provider or become orphans; pending
/// one-shot reads are re-issued.
fn withdraw_observers<T: 'static>(provider: &Node, context: &ContextId, provided: Rc<dyn Any>) -> usize {
    let Ok(provided) = provided.downcast::<Provided<T>>() else {
        return 0;
    };
    let observers = provided.take_observers();
    let count = observers.len();
    if count > 0 {
        provided.run_listeners(provider, LifecycleKind::Unobserve, 0);
    }

    for entry in observers {
        let Some(consumer) = entry.consumer.upgrade() else {
            continue;
        };
        if entry.once {
            super::discovery::dispatch(
                &consumer,
                context,
                ContextRequest {
                    callback: entry.callback,
                    subscribe: false,
                },
            );
        } else {
            consumer.clear_subscription(context, entry.id);
            super::discovery::subscribe(&consumer, context, entry.callback);
        }
    }
    count
}

impl Node {
    /// Provide `value` for `context` to this node's subtree.
    ///
    /// Re-registering on the same node replaces the value but keeps existing
    /// observers and lifecycle listeners; observers are not notified until
    /// the next [`update_context`](Node::update_context).
    pub fn register_context<T: Clone + 'static>(&self, context: &Context<T>, value: T) {
        self.register_context_with(context, value, |_, value: &T| Some(value.clone()));
    }

    /// Provide `context` through a getter evaluated against `payload`.
    ///
    /// The getter runs on every discovery and update. Returning `None`
    /// defers delivery until a later update yields a value.
    pub fn register_context_with<T, P, G>(&self, context: &Context<T>, payload: P, getter: G)
    where
        T: 'static,
        P: 'static,
        G: Fn(&Node, &P) -> Option<T> + 'static,
    {
        self.register_provided(context, payload, getter);
    }

    pub(crate) fn register_provided<T, P, G>(&self, context: &Context<T>, payload: P, getter: G) -> Rc<Provided<T>>
    where
        T: 'static,
        P: 'static,
        G: Fn(&Node, &P) -> Option<T> + 'static,
    {
        let source = ValueSource::new(payload, getter);
        let context = context.id();
        let provided = match self.lookup::<T>(context) {
            Lookup::Found(provided) => {
                tracing::debug!(context = %context, provider = self.label(), "registration replaced");
                provided.replace_source(source);
                provided
            }
            _ => {
                let provided = Rc::new(Provided::new(source));
                let registration = Registration {
                    provided: Rc::clone(&provided) as Rc<dyn Any>,
                    withdraw: withdraw_observers::<T>,
                };
                let previous = self
                    .inner
                    .provided
                    .borrow_mut()
                    .insert(context.clone(), registration);
                tracing::debug!(context = %context, provider = self.label(), "context registered");

                if let Some(previous) = previous {
                    let moved = (previous.withdraw)(self, context, previous.provided);
                    tracing::warn!(
                        context = %context,
                        provider = self.label(),
                        observers = moved,
                        "registration replaced with a different value type; observers rediscovering"
                    );
                }
                provided
            }
        };
        self.runtime().context_registered(context);
        provided
    }

    /// Re-evaluate the value source and notify every observer.
    ///
    /// Observers are visited in registration order. One-shot observers are
    /// removed before their delivery. A callback that updates the same
    /// context again recurses synchronously.
    pub fn update_context<T: 'static>(&self, context: &Context<T>) -> Result<()> {
        let provided = self.registration::<T>(context.id(), "update_context")?;
        notify_observers(self, context.id(), &provided);
        Ok(())
    }

    /// Replace the payload, then behave like [`update_context`](Node::update_context).
    ///
    /// The payload must have the type the context was registered with.
    pub fn update_context_with<T: 'static, P: 'static>(&self, context: &Context<T>, payload: P) -> Result<()> {
        let provided = self.registration::<T>(context.id(), "update_context")?;
        if !provided.set_payload(payload) {
            return Err(ContextError::PayloadMismatch {
                context: context.name().to_string(),
            });
        }
        notify_observers(self, context.id(), &provided);
        Ok(())
    }

    /// Register a listener fired with the observer count after each new observer.
    pub fn on_context_observe<T, F>(&self, context: &Context<T>, callback: F) -> Result<()>
    where
        T: 'static,
        F: Fn(&Node, usize) + 'static,
    {
        let provided = self.registration::<T>(context.id(), "on_context_observe")?;
        provided.add_listener(LifecycleKind::Observe, Rc::new(callback));
        Ok(())
    }

    /// Register a listener fired with the observer count after each removal.
    pub fn on_context_unobserve<T, F>(&self, context: &Context<T>, callback: F) -> Result<()>
    where
        T: 'static,
        F: Fn(&Node, usize) + 'static,
    {
        let provided = self.registration::<T>(context.id(), "on_context_unobserve")?;
        provided.add_listener(LifecycleKind::Unobserve, Rc::new(callback));
        Ok(())
    }

    /// Withdraw a registration.
    ///
    /// `unobserve` listeners fire once with a count of zero. Every consumer
    /// that was subscribed here rediscovers immediately and either resolves
    /// to a farther provider or becomes an orphan. Pending one-shot reads are
    /// re-issued and stay pending if nothing answers them.
    pub fn unregister_context<T: 'static>(&self, context: &Context<T>) -> Result<()> {
        let id = context.id();
        self.registration::<T>(id, "unregister_context")?;
        let removed = self.inner.provided.borrow_mut().remove(id);
        if let Some(registration) = removed {
            let observers = (registration.withdraw)(self, id, registration.provided);
            tracing::debug!(context = %id, provider = self.label(), observers, "context unregistered");
        }
        Ok(())
    }

    /// Number of observers currently attached to this node's registration.
    ///
    /// Zero when the context is not registered here.
    pub fn observer_count<T: 'static>(&self, context: &Context<T>) -> usize {
        match self.lookup::<T>(context.id()) {
            Lookup::Found(provided) => provided.observer_count(),
            _ => 0,
        }
    }

    /// Check whether this node provides a context.
    pub fn provides<T>(&self, context: &Context<T>) -> bool {
        self.inner.provided.borrow().contains_key(context.id())
    }

    pub(crate) fn lookup<T: 'static>(&self, context: &ContextId) -> Lookup<T> {
        let entry = self
            .inner
            .provided
            .borrow()
            .get(context)
            .map(|registration| Rc::clone(&registration.provided));
        match entry {
            None => Lookup::Missing,
            Some(entry) => match entry.downcast::<Provided<T>>() {
                Ok(provided) => Lookup::Found(provided),
                Err(_) => Lookup::WrongType,
            },
        }
    }

    fn registration<T: 'static>(&self, context: &ContextId, operation: &'static str) -> Result<Rc<Provided<T>>> {
        match self.lookup::<T>(context) {
            Lookup::Found(provided) => Ok(provided),
            Lookup::Missing => Err(ContextError::NotRegistered {
                operation,
                context: context.name().to_string(),
            }),
            Lookup::WrongType => Err(ContextError::TypeMismatch {
                operation,
                context: context.name().to_string(),
            }),
        }
    }
}
