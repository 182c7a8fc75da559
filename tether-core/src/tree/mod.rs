//! Component Tree
//!
//! This module implements the hierarchical tree that contexts are scoped to.
//!
//! # Overview
//!
//! Parents own their children; children keep a weak link to their parent.
//! Discovery only ever walks upward, so the parent link is the one edge the
//! context protocol depends on. Each node additionally carries its own
//! provider registrations and its back-references to the providers it
//! observes.

mod node;

pub use node::{Ancestors, Node, NodeId, WeakNode};
