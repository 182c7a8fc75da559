//! Tree Nodes
//!
//! This module defines the node handle that forms the component tree and
//! carries each node's context bookkeeping.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::{ChangeHook, ContextId, Registration, Subscription};
use crate::runtime::ContextRuntime;

/// Unique identifier for a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared interior of a [`Node`].
pub(crate) struct NodeInner {
    id: NodeId,
    label: String,
    runtime: ContextRuntime,

    /// Weak link toward the root. Parents own their children.
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<Vec<Node>>,

    /// Registrations this node provides, keyed by context.
    pub(crate) provided: RefCell<HashMap<ContextId, Registration>>,

    /// Back-references to the providers this node is subscribed to.
    pub(crate) providers: RefCell<HashMap<ContextId, Subscription>>,

    /// Values written by the default setter.
    pub(crate) values: RefCell<HashMap<ContextId, Rc<dyn Any>>>,

    /// Hook fired by the default setter when a value changes.
    pub(crate) change_hook: RefCell<Option<ChangeHook>>,
}

/// A node in the component tree.
///
/// `Node` is a cheap handle; clones refer to the same node. Equality is
/// identity.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Rc<NodeInner>,
}

/// A non-owning reference to a [`Node`].
#[derive(Clone, Default)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    /// Upgrade to a live node, if it still exists.
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => f.debug_tuple("WeakNode").field(&node.id()).finish(),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl Node {
    /// Create a detached node bound to the given runtime.
    pub fn new(runtime: &ContextRuntime, label: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id: NodeId::new(),
                label: label.into(),
                runtime: runtime.clone(),
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
                provided: RefCell::new(HashMap::new()),
                providers: RefCell::new(HashMap::new()),
                values: RefCell::new(HashMap::new()),
                change_hook: RefCell::new(None),
            }),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the node's label.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Get the runtime this node belongs to.
    pub fn runtime(&self) -> &ContextRuntime {
        &self.inner.runtime
    }

    /// Create a weak reference to this node.
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Get the parent node, if attached.
    pub fn parent(&self) -> Option<Node> {
        self.inner
            .parent
            .borrow()
            .upgrade()
            .map(|inner| Node { inner })
    }

    /// Get a snapshot of the children, in insertion order.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.borrow().clone()
    }

    /// Iterate over strict ancestors, nearest first.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors { next: self.parent() }
    }

    /// Iterate over this node followed by its ancestors.
    pub fn self_and_ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Check whether `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Node) -> bool {
        other.self_and_ancestors().any(|node| node == *self)
    }

    /// Attach `child` as the last child of this node.
    ///
    /// The child is first detached from any previous parent. Attaching a node
    /// to itself or to one of its own descendants is ignored.
    pub fn append_child(&self, child: &Node) {
        if child.contains(self) {
            tracing::warn!(
                parent = self.label(),
                child = child.label(),
                "refusing to attach a node inside its own subtree"
            );
            return;
        }
        child.detach();
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
        self.inner.children.borrow_mut().push(child.clone());
    }

    /// Detach `child` from this node. Returns false if it was not a child.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut children = self.inner.children.borrow_mut();
            match children.iter().position(|c| c == child) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            *child.inner.parent.borrow_mut() = Weak::new();
        }
        removed
    }

    /// Detach this node from its parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

/// Iterator walking toward the root.
pub struct Ancestors {
    next: Option<Node>,
}

impl Iterator for Ancestors {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}
