//! Resource manager statistics for auto-balancing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use balancer_types::{BalancerError, RebalanceOutcome};

/// Where the auto-balancer reports its counters.
pub trait StatsSink: Send + Sync {
    /// Count one audit attempt. Called once per fire, before the lock is tried.
    fn inc_auto_rebalance_attempts(&self) -> Result<(), BalancerError>;

    /// Record the result of a completed rebalance.
    fn record_rebalance(&self, _outcome: &RebalanceOutcome) -> Result<(), BalancerError> {
        Ok(())
    }
}

/// Point-in-time copy of `ResourceManagerStats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub auto_rebalance_attempts: u64,
    pub rebalances_completed: u64,
    pub bucket_transfers: u64,
    pub bucket_transfer_bytes: u64,
    pub last_rebalance: Option<RebalanceOutcome>,
}

/// In-memory resource manager statistics of one member.
#[derive(Default)]
pub struct ResourceManagerStats {
    auto_rebalance_attempts: AtomicU64,
    rebalances_completed: AtomicU64,
    bucket_transfers: AtomicU64,
    bucket_transfer_bytes: AtomicU64,
    last_rebalance: Mutex<Option<RebalanceOutcome>>,
}

impl ResourceManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_rebalance_attempts(&self) -> u64 {
        self.auto_rebalance_attempts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            auto_rebalance_attempts: self.auto_rebalance_attempts.load(Ordering::Relaxed),
            rebalances_completed: self.rebalances_completed.load(Ordering::Relaxed),
            bucket_transfers: self.bucket_transfers.load(Ordering::Relaxed),
            bucket_transfer_bytes: self.bucket_transfer_bytes.load(Ordering::Relaxed),
            last_rebalance: *self
                .last_rebalance
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        }
    }
}

impl StatsSink for ResourceManagerStats {
    fn inc_auto_rebalance_attempts(&self) -> Result<(), BalancerError> {
        self.auto_rebalance_attempts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_rebalance(&self, outcome: &RebalanceOutcome) -> Result<(), BalancerError> {
        self.rebalances_completed.fetch_add(1, Ordering::Relaxed);
        self.bucket_transfers
            .fetch_add(outcome.bucket_transfers, Ordering::Relaxed);
        self.bucket_transfer_bytes
            .fetch_add(outcome.bucket_transfer_bytes, Ordering::Relaxed);
        *self
            .last_rebalance
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(*outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_are_counted() {
        let stats = ResourceManagerStats::new();
        stats.inc_auto_rebalance_attempts().unwrap();
        stats.inc_auto_rebalance_attempts().unwrap();
        assert_eq!(stats.auto_rebalance_attempts(), 2);
        assert_eq!(stats.snapshot().rebalances_completed, 0);
    }

    #[test]
    fn test_record_rebalance_accumulates() {
        let stats = ResourceManagerStats::new();
        stats.record_rebalance(&RebalanceOutcome::new(3, 300)).unwrap();
        let last = RebalanceOutcome::new(2, 50).simulated();
        stats.record_rebalance(&last).unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rebalances_completed, 2);
        assert_eq!(snapshot.bucket_transfers, 5);
        assert_eq!(snapshot.bucket_transfer_bytes, 350);
        assert_eq!(snapshot.last_rebalance, Some(last));
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = ResourceManagerStats::new();
        stats.inc_auto_rebalance_attempts().unwrap();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"auto_rebalance_attempts\":1"));
    }
}
