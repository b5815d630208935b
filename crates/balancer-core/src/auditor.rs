//! The out-of-balance audit run on every scheduler fire.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use balancer_scheduler::Auditor;
use balancer_types::{AuditOutcome, BalancerError};

use crate::facade::ClusterCoordinationFacade;

/// Audit that rebalances the cluster only while holding the `auto-balance`
/// lock.
///
/// Every member runs this on the same schedule. The lock decides which of
/// them rebalances; the others skip the fire.
pub struct LockingAuditor {
    facade: Arc<dyn ClusterCoordinationFacade>,
}

impl LockingAuditor {
    pub fn new(facade: Arc<dyn ClusterCoordinationFacade>) -> Self {
        Self { facade }
    }

    pub fn facade(&self) -> &Arc<dyn ClusterCoordinationFacade> {
        &self.facade
    }
}

#[async_trait]
impl Auditor for LockingAuditor {
    async fn execute(&self) -> Result<AuditOutcome, BalancerError> {
        self.facade.increment_attempt_counter().await;

        if !self.facade.try_acquire_lock().await {
            debug!("Another member owns auto-balance lock. Skip this attempt to rebalance the cluster");
            return Ok(AuditOutcome::Skipped);
        }

        let lease = LockLease::new(Arc::clone(&self.facade));
        let result = AssertUnwindSafe(self.facade.run_rebalance())
            .catch_unwind()
            .await;
        lease.release().await;

        let outcome = match result {
            Ok(Ok(rebalanced)) => AuditOutcome::Rebalanced(rebalanced),
            Ok(Err(e)) => {
                warn!(error = %e, "Auto-balance rebalance failed");
                AuditOutcome::failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Auto-balance rebalance panicked");
                AuditOutcome::failed(format!("rebalance panicked: {}", message))
            }
        };
        Ok(outcome)
    }
}

/// Ownership of the `auto-balance` lock for the span of one rebalance.
///
/// `release` gives the lock back. A lease dropped without being released
/// (the audit future was cancelled) schedules the release on the current
/// runtime instead.
struct LockLease {
    facade: Arc<dyn ClusterCoordinationFacade>,
    released: bool,
}

impl LockLease {
    fn new(facade: Arc<dyn ClusterCoordinationFacade>) -> Self {
        Self {
            facade,
            released: false,
        }
    }

    /// The lease only counts as released once `release_lock` returns, so a
    /// cancellation while it is pending still releases from `Drop`.
    async fn release(mut self) {
        let result = self.facade.release_lock().await;
        self.released = true;
        if let Err(e) = result {
            warn!(error = %e, "Failed to release auto-balance lock");
        }
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let facade = Arc::clone(&self.facade);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = facade.release_lock().await {
                        warn!(error = %e, "Failed to release abandoned auto-balance lock");
                    }
                });
            }
            Err(_) => {
                error!("Auto-balance lock abandoned outside of a runtime, it stays held until the member leaves");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
