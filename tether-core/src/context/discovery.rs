//! Discovery Protocol
//!
//! A consumer locates its provider by walking the parent chain. The first
//! node holding a registration for the requested context intercepts the
//! request and the walk stops there, so nearer registrations shadow
//! farther ones.
//!
//! When nothing intercepts, a subscribing consumer is handed to the
//! runtime's orphan table and retried on a later flush. One-shot reads are
//! not retried.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use tokio::sync::oneshot;

use super::id::{Context, ContextId};
use super::registry::{ContextRequest, Lookup};
use super::subscription::Callback;
use super::value::context_setter;
use crate::config::DiscoveryStart;
use crate::scheduler::RetryFn;
use crate::tree::Node;

/// Outcome of a single discovery walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discovery {
    Resolved,
    Unresolved,
}

/// Walk toward the root and let the first matching provider intercept.
pub(crate) fn dispatch<T: 'static>(consumer: &Node, context: &ContextId, request: ContextRequest<T>) -> Discovery {
    let walk = match consumer.runtime().config().discovery_start {
        DiscoveryStart::Consumer => consumer.self_and_ancestors(),
        DiscoveryStart::Parent => consumer.ancestors(),
    };

    for node in walk {
        match node.lookup::<T>(context) {
            Lookup::Found(provided) => {
                tracing::trace!(
                    context = %context,
                    consumer = consumer.label(),
                    provider = node.label(),
                    "discovery intercepted"
                );
                provided.intercept(&node, consumer, context, request);
                return Discovery::Resolved;
            }
            Lookup::WrongType => {
                tracing::warn!(
                    context = %context,
                    consumer = consumer.label(),
                    provider = node.label(),
                    "skipping registration with a different value type"
                );
            }
            Lookup::Missing => {}
        }
    }
    Discovery::Unresolved
}

/// Subscribe `consumer`, falling back to the orphan table.
pub(crate) fn subscribe<T: 'static>(consumer: &Node, context: &ContextId, callback: Callback<T>) {
    let request = ContextRequest {
        callback: Rc::clone(&callback),
        subscribe: true,
    };
    if dispatch(consumer, context, request) == Discovery::Resolved {
        // An earlier failed attempt may still be waiting for a flush.
        if consumer.runtime().remove_orphan(context, consumer.id()) {
            tracing::debug!(context = %context, consumer = consumer.label(), "stale orphan withdrawn");
        }
        return;
    }

    let retry_context = context.clone();
    let retry: RetryFn = Rc::new(move |consumer: &Node| {
        let request = ContextRequest {
            callback: Rc::clone(&callback),
            subscribe: true,
        };
        dispatch(consumer, &retry_context, request) == Discovery::Resolved
    });
    consumer.runtime().add_orphan(consumer, context, retry);
}

impl Node {
    /// Observe a context with the default setter.
    ///
    /// The value lands in this node's slot (see [`Node::context_value`]) and
    /// the context-changed hook fires whenever it differs from the previous
    /// one. If no provider is reachable yet, the node is retried on the next
    /// orphan flush.
    pub fn observe_context<T>(&self, context: &Context<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        self.observe_context_with(context, context.id().clone(), context_setter::<T>);
    }

    /// Observe a context with a custom setter.
    ///
    /// `setter(consumer, value, payload)` runs synchronously with the initial
    /// value and again on every update. Observing a context that is already
    /// resolved swaps the setter in place and re-delivers the current value,
    /// without adding a second observer entry.
    pub fn observe_context_with<T, P, S>(&self, context: &Context<T>, payload: P, setter: S)
    where
        T: 'static,
        P: 'static,
        S: Fn(&Node, &T, &P) + 'static,
    {
        let consumer = self.downgrade();
        let callback: Callback<T> = Rc::new(move |value: &T| {
            if let Some(consumer) = consumer.upgrade() {
                setter(&consumer, value, &payload);
            }
        });
        self.observe_with_callback(context.id(), callback);
    }

    fn observe_with_callback<T: 'static>(&self, context: &ContextId, callback: Callback<T>) {
        if let Some(subscription) = self.subscription(context) {
            if let Some(provider) = subscription.provider() {
                if let Lookup::Found(provided) = provider.lookup::<T>(context) {
                    if provided.replace_callback(subscription.observer(), Rc::clone(&callback)) {
                        tracing::trace!(context = %context, consumer = self.label(), "re-observed; setter replaced");
                        if let Some(value) = provided.current_value(&provider) {
                            callback(&value);
                        }
                        return;
                    }
                }
            }
            self.inner.providers.borrow_mut().remove(context);
            subscription.unsubscribe();
        }
        subscribe(self, context, callback);
    }

    /// Read a context once.
    ///
    /// Resolves with the current value, or with the first value produced by
    /// a provider whose getter has none yet. If no provider is reachable the
    /// future never resolves; apply a timeout where that matters.
    pub fn get_context<T>(&self, context: &Context<T>) -> impl Future<Output = T> + 'static
    where
        T: Clone + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let sender = RefCell::new(Some(sender));
        let callback: Callback<T> = Rc::new(move |value: &T| {
            if let Some(sender) = sender.borrow_mut().take() {
                let _ = sender.send(value.clone());
            }
        });

        let request = ContextRequest {
            callback,
            subscribe: false,
        };
        if dispatch(self, context.id(), request) == Discovery::Unresolved {
            tracing::debug!(context = %context.id(), consumer = self.label(), "one-shot read found no provider");
        }

        async move {
            match receiver.await {
                Ok(value) => value,
                Err(_) => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::context::create_context;
    use crate::runtime::ContextRuntime;
    use std::cell::Cell;

    struct Family {
        root: Node,
        grandfather: Node,
        parent: Node,
        child: Node,
        grandfather2: Node,
        child3: Node,
    }

    fn family(rt: &ContextRuntime) -> Family {
        let root = Node::new(rt, "root");
        let grandfather = Node::new(rt, "grandfather");
        let parent = Node::new(rt, "parent");
        let child = Node::new(rt, "child");
        let parent2 = Node::new(rt, "parent2");
        let grandfather2 = Node::new(rt, "grandfather2");
        let parent3 = Node::new(rt, "parent3");
        let child3 = Node::new(rt, "child3");

        root.append_child(&grandfather);
        grandfather.append_child(&parent);
        parent.append_child(&child);
        grandfather.append_child(&parent2);
        root.append_child(&grandfather2);
        grandfather2.append_child(&parent3);
        parent3.append_child(&child3);

        Family {
            root,
            grandfather,
            parent,
            child,
            grandfather2,
            child3,
        }
    }

    #[test]
    fn descendants_receive_value() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::named("key");
        f.grandfather.register_context(&ctx, "value");

        f.parent.observe_context(&ctx);
        f.child.observe_context(&ctx);

        assert_eq!(f.parent.context_value(&ctx), Some("value"));
        assert_eq!(f.child.context_value(&ctx), Some("value"));
    }

    #[test]
    fn ancestors_and_siblings_do_not_resolve() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::named("key");
        f.grandfather.register_context(&ctx, "value");

        f.root.observe_context(&ctx);
        f.grandfather2.observe_context(&ctx);
        f.child3.observe_context(&ctx);

        assert_eq!(f.root.context_value(&ctx), None);
        assert_eq!(f.grandfather2.context_value(&ctx), None);
        assert_eq!(f.child3.context_value(&ctx), None);
        assert_eq!(rt.orphan_count(ctx.id()), 3);
    }

    #[test]
    fn nearest_registration_wins() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::named("key");
        f.grandfather.register_context(&ctx, "value");
        f.parent.register_context(&ctx, "value2");

        f.child.observe_context(&ctx);
        assert_eq!(f.child.context_value(&ctx), Some("value2"));
        assert_eq!(f.child.provider_of(&ctx), Some(f.parent.clone()));
    }

    #[test]
    fn other_keys_do_not_shadow() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let key = Context::named("key");
        f.grandfather.register_context(&key, "value");
        f.parent.register_context(&Context::named("key2"), "value2");

        f.child.observe_context(&key);
        assert_eq!(f.child.context_value(&key), Some("value"));
    }

    #[test]
    fn tokens_with_equal_names_do_not_shadow() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = create_context::<&str>("myContext");
        let other = create_context::<&str>("myContext");
        f.grandfather.register_context(&ctx, "value");
        f.parent.register_context(&other, "value2");

        f.child.observe_context(&ctx);
        assert_eq!(f.child.context_value(&ctx), Some("value"));
    }

    #[test]
    fn custom_setter_receives_payload() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::named("key");
        f.grandfather.register_context(&ctx, "value");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        f.child.observe_context_with(&ctx, "otherProp", move |node: &Node, value: &&str, prop: &&str| {
            sink.borrow_mut().push(format!("{}.{}={}", node.label(), prop, value));
        });

        assert_eq!(*seen.borrow(), vec!["child.otherProp=value".to_string()]);
    }

    #[test]
    fn re_observe_does_not_duplicate_entries() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::<u32>::named("count");
        f.grandfather.register_context(&ctx, 1);
        let observed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&observed);
        f.grandfather
            .on_context_observe(&ctx, move |_, _| counter.set(counter.get() + 1))
            .unwrap();

        f.child.observe_context(&ctx);
        f.child.observe_context(&ctx);
        f.child.observe_context(&ctx);

        assert_eq!(f.grandfather.observer_count(&ctx), 1);
        assert_eq!(observed.get(), 1);
        assert_eq!(f.child.context_value(&ctx), Some(1));
    }

    #[test]
    fn consumer_start_resolves_own_registration() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::named("self");
        f.grandfather.register_context(&ctx, "outer");
        f.parent.register_context(&ctx, "own");

        f.parent.observe_context(&ctx);
        assert_eq!(f.parent.context_value(&ctx), Some("own"));
    }

    #[test]
    fn parent_start_skips_own_registration() {
        let rt = ContextRuntime::new(RuntimeConfig {
            discovery_start: DiscoveryStart::Parent,
            ..RuntimeConfig::default()
        });
        let f = family(&rt);
        let ctx = Context::named("self");
        f.grandfather.register_context(&ctx, "outer");
        f.parent.register_context(&ctx, "own");

        f.parent.observe_context(&ctx);
        assert_eq!(f.parent.context_value(&ctx), Some("outer"));
    }

    #[test]
    fn setter_may_unobserve_during_first_delivery() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::<u8>::named("bail");
        f.grandfather.register_context(&ctx, 1);
        let bail = ctx.clone();

        f.child.observe_context_with(&ctx, (), move |node: &Node, _: &u8, _: &()| {
            node.unobserve_context(&bail);
        });

        assert!(!f.child.is_observing(&ctx));
        assert_eq!(f.grandfather.observer_count(&ctx), 0);
    }

    #[tokio::test]
    async fn get_context_resolves_current_value() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::<String>::named("once");
        f.grandfather.register_context(&ctx, "now".to_string());

        let value = f.child.get_context(&ctx).await;
        assert_eq!(value, "now");
        assert_eq!(f.grandfather.observer_count(&ctx), 0);
    }

    #[tokio::test]
    async fn get_context_waits_for_pending_value() {
        let rt = ContextRuntime::default();
        let f = family(&rt);
        let ctx = Context::<u32>::named("later");
        f.grandfather
            .register_context_with(&ctx, None::<u32>, |_, value: &Option<u32>| *value);

        let read = f.child.get_context(&ctx);
        assert_eq!(f.grandfather.observer_count(&ctx), 1);

        f.grandfather.update_context_with(&ctx, Some(9u32)).unwrap();
        assert_eq!(f.grandfather.observer_count(&ctx), 0);
        assert_eq!(read.await, 9);
    }
}
