//! Microtask queue.
//!
//! A FIFO of deferred callbacks drained by the host at the end of each
//! synchronous turn.

use std::collections::VecDeque;
use std::fmt;

/// A deferred callback.
pub(crate) type Microtask = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct MicrotaskQueue {
    tasks: VecDeque<Microtask>,
}

impl MicrotaskQueue {
    pub(crate) fn push(&mut self, task: Microtask) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop(&mut self) -> Option<Microtask> {
        self.tasks.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("len", &self.tasks.len())
            .finish()
    }
}
