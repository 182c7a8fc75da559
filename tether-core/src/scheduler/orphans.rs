//! Orphan table.
//!
//! Orphans are grouped per context and keyed by consumer, so observing the
//! same context again from the same consumer replaces its record instead of
//! duplicating it. Every record carries a generation; a flush only removes
//! the exact record it retried, never one that replaced it meanwhile.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::context::ContextId;
use crate::tree::{Node, NodeId, WeakNode};

/// Re-runs discovery for a consumer; returns true once it resolved.
pub(crate) type RetryFn = Rc<dyn Fn(&Node) -> bool>;

#[derive(Clone)]
pub(crate) struct OrphanRecord {
    pub(crate) consumer: WeakNode,
    pub(crate) retry: RetryFn,
    pub(crate) generation: u64,
}

#[derive(Default)]
pub(crate) struct OrphanTable {
    orphans: HashMap<ContextId, IndexMap<NodeId, OrphanRecord>>,
    /// Contexts waiting for the next flush.
    pending: IndexSet<ContextId>,
    next_generation: u64,
}

impl OrphanTable {
    pub(crate) fn insert(&mut self, context: &ContextId, node: NodeId, consumer: WeakNode, retry: RetryFn) {
        self.next_generation += 1;
        let record = OrphanRecord {
            consumer,
            retry,
            generation: self.next_generation,
        };
        self.orphans
            .entry(context.clone())
            .or_default()
            .insert(node, record);
    }

    pub(crate) fn remove(&mut self, context: &ContextId, node: NodeId) -> bool {
        let Some(records) = self.orphans.get_mut(context) else {
            return false;
        };
        let removed = records.shift_remove(&node).is_some();
        if records.is_empty() {
            self.orphans.remove(context);
        }
        removed
    }

    pub(crate) fn remove_if_current(&mut self, context: &ContextId, node: NodeId, generation: u64) -> bool {
        if self.is_current(context, node, generation) {
            self.remove(context, node)
        } else {
            false
        }
    }

    pub(crate) fn is_current(&self, context: &ContextId, node: NodeId, generation: u64) -> bool {
        self.orphans
            .get(context)
            .and_then(|records| records.get(&node))
            .is_some_and(|record| record.generation == generation)
    }

    pub(crate) fn count(&self, context: &ContextId) -> usize {
        self.orphans.get(context).map_or(0, IndexMap::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.orphans.values().map(IndexMap::len).sum()
    }

    /// Records for a context, in the order consumers were orphaned.
    pub(crate) fn snapshot(&self, context: &ContextId) -> Vec<(NodeId, OrphanRecord)> {
        self.orphans
            .get(context)
            .map(|records| {
                records
                    .iter()
                    .map(|(node, record)| (*node, record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn mark_pending(&mut self, context: &ContextId) {
        self.pending.insert(context.clone());
    }

    pub(crate) fn take_pending(&mut self) -> IndexSet<ContextId> {
        std::mem::take(&mut self.pending)
    }
}
