//! Context Runtime
//!
//! The runtime is the process-wide service shared by every node of a tree.
//! It owns the orphan table and the microtask queue that drives orphan
//! retries.
//!
//! # How It Works
//!
//! 1. Every node is created against a runtime and keeps a handle to it.
//!
//! 2. When discovery fails, the consumer is recorded as an orphan.
//!
//! 3. Orphan retries never run inside a context operation. They are queued
//!    as a single coalesced flush microtask, which runs when the host calls
//!    [`ContextRuntime::run_microtasks`] at the end of its synchronous turn.
//!
//! # Thread Safety
//!
//! The runtime is single-threaded (`Rc` + `RefCell`). No borrow is held
//! across a user callback, so callbacks may freely call back into any
//! context operation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::{OrphanRetry, RuntimeConfig};
use crate::context::ContextId;
use crate::scheduler::{Microtask, MicrotaskQueue, OrphanTable, RetryFn};
use crate::tree::{Node, NodeId};

struct RuntimeInner {
    config: RuntimeConfig,
    microtasks: RefCell<MicrotaskQueue>,
    orphans: RefCell<OrphanTable>,
    flush_scheduled: Cell<bool>,
}

/// Handle to the shared context runtime.
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct ContextRuntime {
    inner: Rc<RuntimeInner>,
}

impl ContextRuntime {
    /// Create a runtime with the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                microtasks: RefCell::new(MicrotaskQueue::default()),
                orphans: RefCell::new(OrphanTable::default()),
                flush_scheduled: Cell::new(false),
            }),
        }
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Queue a callback for the next microtask drain.
    pub fn queue_microtask<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner
            .microtasks
            .borrow_mut()
            .push(Box::new(task) as Microtask);
    }

    /// Run queued microtasks in FIFO order, including any queued while
    /// draining, up to the configured budget.
    ///
    /// Returns the number of microtasks run.
    pub fn run_microtasks(&self) -> usize {
        let limit = self.inner.config.microtask_limit();
        let mut ran = 0;
        loop {
            if limit.is_some_and(|limit| ran >= limit) {
                break;
            }
            let task = self.inner.microtasks.borrow_mut().pop();
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, left = self.pending_microtasks(), "microtasks drained");
        }
        ran
    }

    /// Number of microtasks waiting to run.
    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// Check whether an orphan flush is queued.
    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.flush_scheduled.get()
    }

    /// Number of consumers waiting for a provider of `context`.
    pub fn orphan_count(&self, context: &ContextId) -> usize {
        self.inner.orphans.borrow().count(context)
    }

    /// Number of consumers waiting for any provider.
    pub fn total_orphans(&self) -> usize {
        self.inner.orphans.borrow().total()
    }

    pub(crate) fn add_orphan(&self, consumer: &Node, context: &ContextId, retry: RetryFn) {
        self.inner
            .orphans
            .borrow_mut()
            .insert(context, consumer.id(), consumer.downgrade(), retry);
        tracing::debug!(context = %context, consumer = consumer.label(), "no provider found; consumer orphaned");

        if self.inner.config.orphan_retry == OrphanRetry::OnFailure {
            self.schedule_flush(context);
        }
    }

    pub(crate) fn remove_orphan(&self, context: &ContextId, consumer: NodeId) -> bool {
        self.inner.orphans.borrow_mut().remove(context, consumer)
    }

    /// A provider registered `context`; retry its orphans if there are any.
    pub(crate) fn context_registered(&self, context: &ContextId) {
        if self.orphan_count(context) > 0 {
            self.schedule_flush(context);
        }
    }

    fn schedule_flush(&self, context: &ContextId) {
        self.inner.orphans.borrow_mut().mark_pending(context);
        if self.inner.flush_scheduled.replace(true) {
            return;
        }
        let runtime: Weak<RuntimeInner> = Rc::downgrade(&self.inner);
        self.queue_microtask(move || {
            if let Some(inner) = runtime.upgrade() {
                ContextRuntime { inner }.flush();
            }
        });
    }

    /// Retry every orphan of every pending context exactly once.
    fn flush(&self) {
        let contexts = {
            let mut orphans = self.inner.orphans.borrow_mut();
            self.inner.flush_scheduled.set(false);
            orphans.take_pending()
        };
        tracing::debug!(contexts = contexts.len(), "flushing orphans");

        for context in contexts {
            let records = self.inner.orphans.borrow().snapshot(&context);
            for (node, record) in records {
                if !self.inner.orphans.borrow().is_current(&context, node, record.generation) {
                    continue;
                }
                let Some(consumer) = record.consumer.upgrade() else {
                    self.inner
                        .orphans
                        .borrow_mut()
                        .remove_if_current(&context, node, record.generation);
                    continue;
                };
                if (record.retry)(&consumer) {
                    self.inner
                        .orphans
                        .borrow_mut()
                        .remove_if_current(&context, node, record.generation);
                    tracing::debug!(context = %context, consumer = consumer.label(), "orphan resolved");
                }
            }
        }
    }
}

impl Default for ContextRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for ContextRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRuntime")
            .field("config", &self.inner.config)
            .field("pending_microtasks", &self.pending_microtasks())
            .field("orphans", &self.total_orphans())
            .field("flush_scheduled", &self.is_flush_scheduled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn microtasks_queued_while_draining_run_in_same_drain() {
        let rt = ContextRuntime::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let outer_log = Rc::clone(&log);
        let outer_rt = rt.clone();
        rt.queue_microtask(move || {
            outer_log.borrow_mut().push("first");
            let inner_log = Rc::clone(&outer_log);
            outer_rt.queue_microtask(move || inner_log.borrow_mut().push("nested"));
        });
        let second_log = Rc::clone(&log);
        rt.queue_microtask(move || second_log.borrow_mut().push("second"));

        assert_eq!(rt.run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec!["first", "second", "nested"]);
    }

    #[test]
    fn budget_leaves_remaining_microtasks_queued() {
        let rt = ContextRuntime::new(RuntimeConfig {
            microtask_budget: 2,
            ..RuntimeConfig::default()
        });
        for _ in 0..5 {
            rt.queue_microtask(|| {});
        }
        assert_eq!(rt.run_microtasks(), 2);
        assert_eq!(rt.pending_microtasks(), 3);
        assert_eq!(rt.run_microtasks(), 2);
        assert_eq!(rt.run_microtasks(), 1);
        assert_eq!(rt.run_microtasks(), 0);
    }

    #[test]
    fn failures_in_one_turn_coalesce_into_one_flush() {
        let rt = ContextRuntime::default();
        let a = Node::new(&rt, "a");
        let b = Node::new(&rt, "b");
        let theme = Context::<u8>::named("theme");
        let locale = Context::<u8>::named("locale");

        a.observe_context(&theme);
        b.observe_context(&theme);
        b.observe_context(&locale);

        assert!(rt.is_flush_scheduled());
        assert_eq!(rt.pending_microtasks(), 1);
        assert_eq!(rt.total_orphans(), 3);

        assert_eq!(rt.run_microtasks(), 1);
        assert!(!rt.is_flush_scheduled());
        assert_eq!(rt.total_orphans(), 3);
    }

    #[test]
    fn on_register_policy_waits_for_a_registration() {
        let rt = ContextRuntime::new(RuntimeConfig {
            orphan_retry: OrphanRetry::OnRegister,
            ..RuntimeConfig::default()
        });
        let provider = Node::new(&rt, "provider");
        let consumer = Node::new(&rt, "consumer");
        let ctx = Context::<u8>::named("late");

        consumer.observe_context(&ctx);
        assert_eq!(rt.pending_microtasks(), 0);

        provider.append_child(&consumer);
        provider.register_context(&ctx, 4);
        assert_eq!(consumer.context_value(&ctx), None);
        assert_eq!(rt.pending_microtasks(), 1);

        rt.run_microtasks();
        assert_eq!(consumer.context_value(&ctx), Some(4));
        assert_eq!(rt.orphan_count(ctx.id()), 0);
    }

    #[test]
    fn dropped_orphans_are_pruned_on_flush() {
        let rt = ContextRuntime::default();
        let ctx = Context::<u8>::named("gone");
        {
            let consumer = Node::new(&rt, "consumer");
            consumer.observe_context(&ctx);
        }
        assert_eq!(rt.orphan_count(ctx.id()), 1);
        rt.run_microtasks();
        assert_eq!(rt.orphan_count(ctx.id()), 0);
    }
}
