//! Error types raised by context operations.
//!
//! Only provider-side misuse is an error. A consumer that finds no provider
//! is in the normal "orphan" state and never surfaces a failure.

use thiserror::Error;

/// Errors produced by provider-side context operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The node holds no registration for the context.
    #[error("{operation}: \"{context}\" is not registered")]
    NotRegistered {
        /// Operation that was attempted.
        operation: &'static str,
        /// Human-readable name of the context.
        context: String,
    },

    /// The node holds a registration for the context, but with another value type.
    #[error("{operation}: \"{context}\" is registered with a different value type")]
    TypeMismatch {
        /// Operation that was attempted.
        operation: &'static str,
        /// Human-readable name of the context.
        context: String,
    },

    /// An update supplied a payload whose type differs from the registered one.
    #[error("update_context: payload type for \"{context}\" does not match its registration")]
    PayloadMismatch {
        /// Human-readable name of the context.
        context: String,
    },
}

impl ContextError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContextError::NotRegistered { .. } => "context_not_registered",
            ContextError::TypeMismatch { .. } => "context_type_mismatch",
            ContextError::PayloadMismatch { .. } => "context_payload_mismatch",
        }
    }
}

/// Errors produced while loading a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result alias for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
