//! Runtime configuration.
//!
//! [`RuntimeConfig`] is handed to [`ContextRuntime::new`](crate::ContextRuntime::new)
//! and fixed for the lifetime of the runtime.
//!
//! ## Sentinel values
//! - `microtask_budget = 0` → unlimited (drain until the queue is empty)

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where the upward discovery walk starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStart {
    /// The consumer itself is inspected first, then its ancestors.
    ///
    /// A node that both provides and observes the same context resolves
    /// to itself.
    #[default]
    Consumer,

    /// Only strict ancestors of the consumer are inspected.
    Parent,
}

/// When pending orphans are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanRetry {
    /// Schedule a flush as soon as a discovery fails, and again whenever a
    /// provider registers the context while orphans are waiting for it.
    #[default]
    OnFailure,

    /// Only a registration of the context schedules a flush.
    OnRegister,
}

/// Configuration for a [`ContextRuntime`](crate::ContextRuntime).
///
/// ## Field semantics
/// - `discovery_start`: first node inspected by discovery
/// - `orphan_retry`: which events schedule an orphan flush
/// - `microtask_budget`: max microtasks per `run_microtasks` call (`0` = unlimited)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// First node inspected by discovery.
    pub discovery_start: DiscoveryStart,

    /// Which events schedule a retry pass over orphans.
    pub orphan_retry: OrphanRetry,

    /// Maximum number of microtasks run by a single `run_microtasks` call.
    ///
    /// Microtasks left over stay queued for the next call.
    pub microtask_budget: usize,
}

impl RuntimeConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns the microtask budget as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` microtasks per drain
    #[inline]
    pub fn microtask_limit(&self) -> Option<usize> {
        if self.microtask_budget == 0 {
            None
        } else {
            Some(self.microtask_budget)
        }
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `discovery_start = Consumer`
    /// - `orphan_retry = OnFailure`
    /// - `microtask_budget = 0` (unlimited)
    fn default() -> Self {
        Self {
            discovery_start: DiscoveryStart::Consumer,
            orphan_retry: OrphanRetry::OnFailure,
            microtask_budget: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.microtask_limit(), None);
    }

    #[test]
    fn fields_parse_in_snake_case() {
        let config = RuntimeConfig::from_json(
            r#"{"discovery_start":"parent","orphan_retry":"on_register","microtask_budget":8}"#,
        )
        .unwrap();
        assert_eq!(config.discovery_start, DiscoveryStart::Parent);
        assert_eq!(config.orphan_retry, OrphanRetry::OnRegister);
        assert_eq!(config.microtask_limit(), Some(8));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{"orphan_retry":"sometimes"}"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid runtime config"));
    }
}
