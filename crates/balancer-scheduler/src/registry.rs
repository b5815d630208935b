//! Audit status tracking.
//!
//! The `AuditRegistry` records what the audit loop of one member has been
//! doing: when it last fired, what happened, and when it fires next.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use balancer_types::AuditOutcome;

/// Snapshot of the audit loop on one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStatus {
    /// Name of the scheduler task
    pub task_name: String,
    /// Cron expression driving the audit, once armed
    pub schedule: Option<String>,
    /// When the last audit started
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the last audit in milliseconds
    pub last_duration_ms: Option<u64>,
    /// Outcome of the last audit
    pub last_result: Option<AuditOutcome>,
    /// When the next audit is armed to fire
    pub next_run: Option<DateTime<Utc>>,
    /// Delay that was armed for the next fire, in milliseconds
    pub next_delay_ms: Option<u64>,
    /// Number of audits fired
    pub attempt_count: u64,
    /// Audits in which this member rebalanced the cluster
    pub rebalance_count: u64,
    /// Audits skipped because another member held the lock
    pub skip_count: u64,
    /// Audits that failed
    pub error_count: u64,
    /// Whether an audit is executing right now
    pub is_running: bool,
}

impl AuditStatus {
    pub fn new(task_name: String) -> Self {
        Self {
            task_name,
            schedule: None,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            next_run: None,
            next_delay_ms: None,
            attempt_count: 0,
            rebalance_count: 0,
            skip_count: 0,
            error_count: 0,
            is_running: false,
        }
    }
}

/// Thread-safe holder of the member's `AuditStatus`.
///
/// # Example
///
/// ```
/// use balancer_scheduler::AuditRegistry;
/// use balancer_types::AuditOutcome;
/// use chrono::Utc;
///
/// let registry = AuditRegistry::new("auto-balancer");
/// registry.record_start(Utc::now());
/// assert!(registry.is_running());
///
/// registry.record_complete(AuditOutcome::Skipped, 3);
/// assert!(!registry.is_running());
/// assert_eq!(registry.status().skip_count, 1);
/// ```
pub struct AuditRegistry {
    status: RwLock<AuditStatus>,
}

impl AuditRegistry {
    pub fn new(task_name: &str) -> Self {
        Self {
            status: RwLock::new(AuditStatus::new(task_name.to_string())),
        }
    }

    fn update(&self, f: impl FnOnce(&mut AuditStatus)) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
    }

    /// Record the schedule the loop was armed with.
    pub fn set_schedule(&self, expression: &str) {
        self.update(|s| s.schedule = Some(expression.to_string()));
    }

    /// Record the next armed fire.
    pub fn record_armed(&self, next: DateTime<Utc>, delay_ms: u64) {
        self.update(|s| {
            s.next_run = Some(next);
            s.next_delay_ms = Some(delay_ms);
        });
    }

    /// Record that an audit has started.
    pub fn record_start(&self, at: DateTime<Utc>) {
        self.update(|s| {
            s.is_running = true;
            s.last_run = Some(at);
            s.attempt_count += 1;
        });
    }

    /// Record that an audit has finished.
    pub fn record_complete(&self, outcome: AuditOutcome, duration_ms: u64) {
        self.update(|s| {
            s.is_running = false;
            s.last_duration_ms = Some(duration_ms);
            match &outcome {
                AuditOutcome::Rebalanced(_) => s.rebalance_count += 1,
                AuditOutcome::Skipped => s.skip_count += 1,
                AuditOutcome::Failed { .. } => s.error_count += 1,
            }
            s.last_result = Some(outcome);
        });
    }

    /// Forget the armed fire once the loop stops.
    pub fn clear_next_run(&self) {
        self.update(|s| {
            s.next_run = None;
            s.next_delay_ms = None;
        });
    }

    pub fn status(&self) -> AuditStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_running
    }
}

impl Default for AuditRegistry {
    fn default() -> Self {
        Self::new("auto-balancer")
    }
}
