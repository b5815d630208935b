//! Rebalance engine capability.
//!
//! How buckets are chosen and moved is the engine's business. The
//! coordinator only decides *when* a rebalance runs and *who* runs it.

use async_trait::async_trait;

use balancer_types::{BalancerError, RebalanceMode, RebalanceOutcome};

/// Relocates data buckets to even out load across members.
#[async_trait]
pub trait RebalanceEngine: Send + Sync {
    /// Run one rebalance.
    ///
    /// In `RebalanceMode::Simulate` the engine computes the moves and reports
    /// them without transferring data. The call may take arbitrarily long and
    /// is never timed out by the caller.
    ///
    /// # Errors
    ///
    /// `BalancerError::Interrupted` or `BalancerError::Cancelled` when the
    /// platform aborts the run, `BalancerError::Rebalance` for any other
    /// engine failure.
    async fn rebalance(&self, mode: RebalanceMode) -> Result<RebalanceOutcome, BalancerError>;
}
