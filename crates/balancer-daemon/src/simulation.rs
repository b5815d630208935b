//! In-process grid used by `balancer-daemon run`.
//!
//! Buckets start piled up on the first member. Each rebalance moves the
//! surplus buckets to the members below the average, either for real or as
//! a simulation that only reports the moves.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use balancer_core::RebalanceEngine;
use balancer_types::{BalancerError, RebalanceMode, RebalanceOutcome};

/// Total buckets of the simulated partitioned region.
pub const DEFAULT_TOTAL_BUCKETS: u64 = 113;

/// Size attributed to each bucket when reporting transferred bytes.
pub const BUCKET_SIZE_BYTES: u64 = 1024 * 1024;

/// Bucket placement shared by every member of the simulated cluster.
pub struct SimulatedGrid {
    buckets: Mutex<Vec<u64>>,
}

impl SimulatedGrid {
    /// Grid with `members` members, all buckets hosted by the first one.
    pub fn skewed(members: usize, total_buckets: u64) -> Self {
        let mut buckets = vec![0; members.max(1)];
        buckets[0] = total_buckets;
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    /// Buckets hosted by each member.
    pub fn layout(&self) -> Vec<u64> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Layout after an even spread. The first `total % members` members
    /// keep one extra bucket.
    fn balanced_layout(current: &[u64]) -> Vec<u64> {
        let members = current.len() as u64;
        let total: u64 = current.iter().sum();
        let base = total / members;
        let extra = total % members;
        (0..members)
            .map(|i| if i < extra { base + 1 } else { base })
            .collect()
    }
}

#[async_trait]
impl RebalanceEngine for SimulatedGrid {
    async fn rebalance(&self, mode: RebalanceMode) -> Result<RebalanceOutcome, BalancerError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let target = Self::balanced_layout(&buckets);

        let moves: u64 = buckets
            .iter()
            .zip(&target)
            .map(|(have, want)| have.saturating_sub(*want))
            .sum();
        debug!(layout = ?*buckets, target = ?target, moves, "Computed bucket moves");

        let outcome = RebalanceOutcome::new(moves, moves * BUCKET_SIZE_BYTES);
        Ok(match mode {
            RebalanceMode::Simulate => outcome.simulated(),
            RebalanceMode::Execute => {
                *buckets = target;
                outcome
            }
        })
    }
}
