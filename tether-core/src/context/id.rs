//! Context identifiers.
//!
//! A context is named either by a plain string or by a generated token.
//! Strings compare by value; tokens compare by their generated id, so two
//! tokens created with the same name are distinct channels.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A unique context token with a human-readable name.
#[derive(Debug, Clone)]
pub struct ContextToken {
    id: u64,
    name: Arc<str>,
}

impl ContextToken {
    /// Generate a new token. Every call yields a distinct channel.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    /// Get the raw token id.
    pub fn raw(&self) -> u64 {
        self.id
    }

    /// Get the token's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ContextToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContextToken {}

impl Hash for ContextToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Untyped identity of a context channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// A plain string key.
    Named(Arc<str>),
    /// A generated unique token.
    Token(ContextToken),
}

impl ContextId {
    /// Human-readable name of the channel.
    pub fn name(&self) -> &str {
        match self {
            ContextId::Named(name) => name,
            ContextId::Token(token) => token.name(),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for ContextId {
    fn from(name: &str) -> Self {
        ContextId::Named(name.into())
    }
}

impl From<ContextToken> for ContextId {
    fn from(token: ContextToken) -> Self {
        ContextId::Token(token)
    }
}

/// Typed handle to a context channel carrying values of type `T`.
///
/// The type parameter only selects how stored values are downcast; channel
/// identity is the wrapped [`ContextId`].
pub struct Context<T> {
    id: ContextId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Context<T> {
    /// A context keyed by a plain string.
    pub fn named(name: &str) -> Self {
        Self::from_id(ContextId::from(name))
    }

    /// Wrap an existing identifier.
    pub fn from_id(id: ContextId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Get the untyped identifier.
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Human-readable name of the channel.
    pub fn name(&self) -> &str {
        self.id.name()
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self::from_id(self.id.clone())
    }
}

impl<T> PartialEq for Context<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Context<T> {}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.id).finish()
    }
}

/// Create a context backed by a fresh unique token.
///
/// ```
/// use tether_core::create_context;
///
/// let a = create_context::<u32>("count");
/// let b = create_context::<u32>("count");
/// assert_ne!(a, b);
/// assert_eq!(a.name(), "count");
/// ```
pub fn create_context<T>(name: &str) -> Context<T> {
    Context::from_id(ContextId::Token(ContextToken::new(name)))
}
