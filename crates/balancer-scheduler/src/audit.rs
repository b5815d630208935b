//! The unit of work run on every scheduler fire.

use async_trait::async_trait;

use balancer_types::{AuditOutcome, BalancerError};

/// One out-of-balance audit cycle.
///
/// The scheduler awaits `execute` before it rearms, so two audits never run
/// at the same time on one member. An `Err` (or a panic) is logged by the
/// scheduler and the next fire is still armed.
#[async_trait]
pub trait Auditor: Send + Sync {
    async fn execute(&self) -> Result<AuditOutcome, BalancerError>;
}
