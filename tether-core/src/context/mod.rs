//! Context Protocol
//!
//! This module implements tree-scoped context channels: a provider node
//! registers a value under a context identifier, and any descendant can
//! discover the nearest such provider, subscribe to it, and receive every
//! later update, without intermediate nodes forwarding anything.
//!
//! # Concepts
//!
//! ## Registration
//!
//! A node holds at most one registration per context. The registration
//! owns the value source, the observer entries in registration order, and
//! lifecycle listeners that fire whenever the observer count changes.
//!
//! ## Discovery
//!
//! Discovery walks the parent chain. The first node holding a matching
//! registration intercepts the request and the walk stops, so a nearer
//! registration shadows a farther one.
//!
//! ## Orphans
//!
//! A consumer that finds no provider is recorded by the runtime and
//! retried at the next microtask boundary. It is never dropped silently:
//! retries continue until it resolves or explicitly unobserves.
//!
//! ## Teardown
//!
//! Each resolved consumer keeps a [`Subscription`] back-reference, so
//! unobserving never walks the tree again.

mod discovery;
mod id;
mod registry;
mod subscription;
mod value;

pub use id::{create_context, Context, ContextId, ContextToken};
pub use registry::LifecycleKind;
pub(crate) use registry::Registration;
pub use subscription::{ObserverId, Subscription};
pub use value::{context_setter, ChangeHook, ContextChange};
