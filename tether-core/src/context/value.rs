//! Consumer-side value slots written by the default setter.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::id::{Context, ContextId};
use crate::tree::Node;

/// Hook fired by the default setter when a context value changes.
pub type ChangeHook = Rc<dyn Fn(&Node, &ContextChange)>;

/// A change of a context value on a consumer.
pub struct ContextChange {
    context: ContextId,
    previous: Option<Rc<dyn Any>>,
    current: Rc<dyn Any>,
}

impl ContextChange {
    /// The context whose value changed.
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// The previous value, if there was one of type `T`.
    pub fn previous<T: 'static>(&self) -> Option<&T> {
        self.previous.as_ref().and_then(|value| value.downcast_ref::<T>())
    }

    /// The new value, if it has type `T`.
    pub fn current<T: 'static>(&self) -> Option<&T> {
        self.current.downcast_ref::<T>()
    }
}

impl fmt::Debug for ContextChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextChange")
            .field("context", &self.context)
            .field("had_previous", &self.previous.is_some())
            .finish()
    }
}

/// The default setter.
///
/// Stores `value` in the consumer's slot for `context`. Equal values are a
/// no-op; otherwise the consumer's context-changed hook fires with the old
/// and new value.
pub fn context_setter<T>(consumer: &Node, value: &T, context: &ContextId)
where
    T: Clone + PartialEq + 'static,
{
    let previous = consumer.inner.values.borrow().get(context).cloned();
    if let Some(previous) = &previous {
        if previous.downcast_ref::<T>() == Some(value) {
            return;
        }
    }

    let current: Rc<dyn Any> = Rc::new(value.clone());
    consumer
        .inner
        .values
        .borrow_mut()
        .insert(context.clone(), Rc::clone(&current));

    let hook = consumer.inner.change_hook.borrow().clone();
    if let Some(hook) = hook {
        let change = ContextChange {
            context: context.clone(),
            previous,
            current,
        };
        hook(consumer, &change);
    }
}

impl Node {
    /// The last value the default setter stored for a context.
    pub fn context_value<T: Clone + 'static>(&self, context: &Context<T>) -> Option<T> {
        self.inner
            .values
            .borrow()
            .get(context.id())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Install the hook fired when the default setter changes a value.
    ///
    /// Replaces any previously installed hook.
    pub fn on_context_changed<F>(&self, hook: F)
    where
        F: Fn(&Node, &ContextChange) + 'static,
    {
        *self.inner.change_hook.borrow_mut() = Some(Rc::new(hook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ContextRuntime;
    use std::cell::RefCell;

    #[test]
    fn setter_fires_hook_only_on_change() {
        let rt = ContextRuntime::default();
        let node = Node::new(&rt, "consumer");
        let ctx = Context::<&str>::named("key");
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        node.on_context_changed(move |_, change| {
            sink.borrow_mut().push((
                change.context().to_string(),
                change.previous::<&str>().copied(),
                change.current::<&str>().copied(),
            ));
        });

        context_setter(&node, &"value", ctx.id());
        context_setter(&node, &"value", ctx.id());
        context_setter(&node, &"value2", ctx.id());

        assert_eq!(
            *changes.borrow(),
            vec![
                ("key".to_string(), None, Some("value")),
                ("key".to_string(), Some("value"), Some("value2")),
            ]
        );
        assert_eq!(node.context_value(&ctx), Some("value2"));
    }

    #[test]
    fn value_of_other_type_reads_as_none() {
        let rt = ContextRuntime::default();
        let node = Node::new(&rt, "consumer");
        context_setter(&node, &1u8, &ContextId::from("n"));
        assert_eq!(node.context_value(&Context::<u8>::named("n")), Some(1));
        assert_eq!(node.context_value(&Context::<u16>::named("n")), None);
    }
}
