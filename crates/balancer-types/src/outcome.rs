//! Results produced by rebalance invocations and audit cycles.

use serde::{Deserialize, Serialize};

/// Result of one rebalance invocation, as reported by the rebalance engine.
///
/// The coordinator only logs and records these numbers. It never uses them
/// to decide whether to rebalance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    /// Number of bucket transfers completed
    pub bucket_transfers: u64,
    /// Total bytes moved by bucket transfers
    pub bucket_transfer_bytes: u64,
    /// Number of primary ownership moves completed
    #[serde(default)]
    pub primary_transfers: u64,
    /// Whether the engine only simulated the moves
    #[serde(default)]
    pub simulated: bool,
}

impl RebalanceOutcome {
    /// Create an outcome with the given bucket transfer totals.
    pub fn new(bucket_transfers: u64, bucket_transfer_bytes: u64) -> Self {
        Self {
            bucket_transfers,
            bucket_transfer_bytes,
            ..Default::default()
        }
    }

    /// Set the number of primary moves.
    pub fn with_primary_transfers(mut self, primary_transfers: u64) -> Self {
        self.primary_transfers = primary_transfers;
        self
    }

    /// Mark the outcome as simulated.
    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }

    /// Whether nothing had to move.
    pub fn is_balanced(&self) -> bool {
        self.bucket_transfers == 0 && self.primary_transfers == 0
    }
}

/// Result of one audit cycle on one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// This member owned the lock and the rebalance returned.
    Rebalanced(RebalanceOutcome),
    /// Another member owns the lock; nothing was done.
    Skipped,
    /// The rebalance failed; the cycle was abandoned.
    Failed { reason: String },
}

impl AuditOutcome {
    /// Build a failed outcome.
    pub fn failed(reason: impl Into<String>) -> Self {
        AuditOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_rebalanced(&self) -> bool {
        matches!(self, AuditOutcome::Rebalanced(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, AuditOutcome::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AuditOutcome::Failed { .. })
    }
}
