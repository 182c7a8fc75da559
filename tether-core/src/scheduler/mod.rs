//! Orphan Scheduler
//!
//! The scheduler resolves the race where a consumer issues discovery before
//! its provider has registered.
//!
//! # Algorithm
//!
//! 1. When discovery fails, the consumer is recorded in the orphan table
//!    under its context, and the context is marked pending.
//! 2. When a provider registers a context that has orphans, the context is
//!    marked pending as well.
//! 3. The first pending mark of a turn queues one flush microtask; later
//!    marks in the same turn coalesce into it.
//! 4. The flush takes the pending set, clears the "scheduled" flag, and
//!    retries every orphan of every taken context exactly once. Resolved
//!    orphans leave the table; the rest wait for the next registration.
//! 5. Orphans created while a flush runs mark their context pending again
//!    and are picked up by a fresh flush, not by the one in progress.

mod microtask;
mod orphans;

pub(crate) use microtask::{Microtask, MicrotaskQueue};
pub(crate) use orphans::{OrphanTable, RetryFn};
