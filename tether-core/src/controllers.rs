//! Provider and consumer controllers.
//!
//! Thin owners that tie a context to a host node's lifecycle. Framework
//! glue calls `connect`/`disconnect` exactly once per attach/detach.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::context::{Context, LifecycleKind};
use crate::error::Result;
use crate::tree::Node;

/// Hooks run by a [`ContextProvider`] around its upstream resources.
///
/// `initialize` runs the first time the context gains an observer and again
/// on reconnect after a disconnect; `finalize` runs on disconnect if the
/// provider was initialized.
pub trait ProviderHooks {
    /// Start upstream work for the provided value.
    fn initialize(&self, _host: &Node) {}
    /// Release what `initialize` started.
    fn finalize(&self, _host: &Node) {}
}

impl ProviderHooks for () {}

struct ProviderState<T> {
    value: RefCell<T>,
    initialized: Cell<bool>,
    finalized: Cell<bool>,
    hooks: Box<dyn ProviderHooks>,
}

/// Owns a context value on a host node.
pub struct ContextProvider<T: 'static> {
    host: Node,
    context: Context<T>,
    state: Rc<ProviderState<T>>,
}

impl<T: Clone + 'static> ContextProvider<T> {
    /// Register `context` on `host` with an initial value.
    pub fn new(host: &Node, context: &Context<T>, initial: T) -> Self {
        Self::with_hooks(host, context, initial, ())
    }

    /// Like [`ContextProvider::new`], with lifecycle hooks.
    pub fn with_hooks<H>(host: &Node, context: &Context<T>, initial: T, hooks: H) -> Self
    where
        H: ProviderHooks + 'static,
    {
        let state = Rc::new(ProviderState {
            value: RefCell::new(initial),
            initialized: Cell::new(false),
            finalized: Cell::new(false),
            hooks: Box::new(hooks),
        });

        let provided = host.register_provided(context, Rc::clone(&state), |_, state: &Rc<ProviderState<T>>| {
            Some(state.value.borrow().clone())
        });

        let weak = Rc::downgrade(&state);
        provided.add_listener(
            LifecycleKind::Observe,
            Rc::new(move |host: &Node, _count: usize| {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                if !state.initialized.get() {
                    state.initialized.set(true);
                    state.hooks.initialize(host);
                }
            }),
        );

        Self {
            host: host.clone(),
            context: context.clone(),
            state,
        }
    }

    /// The current value.
    pub fn value(&self) -> T {
        self.state.value.borrow().clone()
    }

    /// Replace the value and notify observers.
    pub fn set_value(&self, value: T) -> Result<()> {
        *self.state.value.borrow_mut() = value;
        self.host.update_context(&self.context)
    }

    /// Re-run `initialize` if the provider was finalized by a disconnect.
    pub fn connect(&self) {
        if self.state.finalized.get() {
            self.state.finalized.set(false);
            self.state.initialized.set(true);
            self.state.hooks.initialize(&self.host);
        }
    }

    /// Run `finalize` if the provider is initialized.
    pub fn disconnect(&self) {
        if self.state.initialized.get() {
            self.state.initialized.set(false);
            self.state.finalized.set(true);
            self.state.hooks.finalize(&self.host);
        }
    }

    /// Check whether `initialize` has run and `finalize` has not since.
    pub fn is_initialized(&self) -> bool {
        self.state.initialized.get()
    }

    /// The node the context is registered on.
    pub fn host(&self) -> &Node {
        &self.host
    }

    /// The provided context.
    pub fn context(&self) -> &Context<T> {
        &self.context
    }
}

impl<T: 'static> fmt::Debug for ContextProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProvider")
            .field("host", &self.host)
            .field("context", &self.context)
            .field("initialized", &self.state.initialized.get())
            .finish()
    }
}

type ConsumerCallback<T> = Rc<dyn Fn(&Node, &T)>;

/// Observes a context on behalf of a host node and caches the last value.
pub struct ContextConsumer<T: 'static> {
    host: Node,
    context: Context<T>,
    value: Rc<RefCell<Option<T>>>,
    callback: Option<ConsumerCallback<T>>,
}

impl<T: Clone + 'static> ContextConsumer<T> {
    /// A consumer of `context` on `host`; nothing is observed until `connect`.
    pub fn new(host: &Node, context: &Context<T>) -> Self {
        Self {
            host: host.clone(),
            context: context.clone(),
            value: Rc::new(RefCell::new(None)),
            callback: None,
        }
    }

    /// A consumer that also calls `callback` with every delivered value.
    pub fn with_callback<F>(host: &Node, context: &Context<T>, callback: F) -> Self
    where
        F: Fn(&Node, &T) + 'static,
    {
        Self {
            callback: Some(Rc::new(callback)),
            ..Self::new(host, context)
        }
    }

    /// Start observing. Call when the host is attached to the tree.
    pub fn connect(&self) {
        let slot = Rc::clone(&self.value);
        let callback = self.callback.clone();
        self.host
            .observe_context_with(&self.context, (), move |host: &Node, value: &T, _: &()| {
                *slot.borrow_mut() = Some(value.clone());
                if let Some(callback) = &callback {
                    callback(host, value);
                }
            });
    }

    /// Stop observing. Call when the host is detached from the tree.
    pub fn disconnect(&self) {
        self.host.unobserve_context(&self.context);
    }

    /// The last delivered value.
    pub fn value(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    /// The observing node.
    pub fn host(&self) -> &Node {
        &self.host
    }

    /// The observed context.
    pub fn context(&self) -> &Context<T> {
        &self.context
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ContextConsumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConsumer")
            .field("host", &self.host)
            .field("context", &self.context)
            .field("value", &self.value.borrow())
            .finish()
    }
}
