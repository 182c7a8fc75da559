//! Tether Core
//!
//! This crate implements a context protocol for UI component trees:
//!
//! - Tree-scoped context channels identified by name or unique token
//! - Nearest-provider discovery along the parent chain
//! - Subscriptions with synchronous, ordered update fan-out
//! - An orphan scheduler that retries consumers created before their
//!   provider at the next microtask boundary
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `tree`: Component nodes and parent/child structure
//! - `context`: Context identifiers, provider registry, discovery and teardown
//! - `runtime`: The shared service holding the microtask queue and orphans
//! - `controllers`: Provider/consumer owners tied to a host's lifecycle
//! - `config`: Runtime configuration
//!
//! # Example
//!
//! ```rust
//! use tether_core::{create_context, ContextRuntime, Node};
//!
//! let runtime = ContextRuntime::default();
//! let app = Node::new(&runtime, "app");
//! let button = Node::new(&runtime, "button");
//! app.append_child(&button);
//!
//! let theme = create_context::<&str>("theme");
//! app.register_context(&theme, "light");
//! button.observe_context(&theme);
//! assert_eq!(button.context_value(&theme), Some("light"));
//!
//! app.register_context(&theme, "dark");
//! app.update_context(&theme).unwrap();
//! assert_eq!(button.context_value(&theme), Some("dark"));
//! ```

pub mod config;
pub mod context;
pub mod controllers;
mod error;
pub mod runtime;
mod scheduler;
pub mod tree;

pub use config::{DiscoveryStart, OrphanRetry, RuntimeConfig};
pub use context::{
    context_setter, create_context, ChangeHook, Context, ContextChange, ContextId, ContextToken, LifecycleKind,
    ObserverId, Subscription,
};
pub use controllers::{ContextConsumer, ContextProvider, ProviderHooks};
pub use error::{ConfigError, ContextError, Result};
pub use runtime::ContextRuntime;
pub use tree::{Node, NodeId, WeakNode};
