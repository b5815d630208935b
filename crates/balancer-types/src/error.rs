//! Error types for the auto-balancer.

use thiserror::Error;

/// Unified error type for auto-balancing operations.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// Missing or invalid configuration. Fatal to auto-balancing on this
    /// member only.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Distributed lock service failure
    #[error("Lock error: {0}")]
    Lock(String),

    /// Lock release attempted by a member that does not own the lock
    #[error("Lock '{lock}' is owned by member {owner}")]
    LockNotOwned { lock: String, owner: String },

    /// Rebalance engine failure
    #[error("Rebalance error: {0}")]
    Rebalance(String),

    /// Rebalance was interrupted before producing results
    #[error("Rebalance interrupted: {0}")]
    Interrupted(String),

    /// Rebalance was cancelled by the platform
    #[error("Rebalance cancelled: {0}")]
    Cancelled(String),

    /// Operation not allowed in the coordinator's current lifecycle state
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Statistics sink failure
    #[error("Stats error: {0}")]
    Stats(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BalancerError {
    /// Whether this error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, BalancerError::Config(_))
    }

    /// Whether this error comes from calling the coordinator in the wrong
    /// lifecycle state.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, BalancerError::Lifecycle(_))
    }

    /// Whether an audit cycle hitting this error can simply be abandoned
    /// and retried on the next scheduled fire.
    pub fn is_recoverable(&self) -> bool {
        !self.is_config()
    }
}
