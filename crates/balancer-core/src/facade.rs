//! The narrow view of the cluster the auditor works through.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use balancer_types::{BalancerError, MemberId, RebalanceMode, RebalanceOutcome};

use crate::engine::RebalanceEngine;
use crate::lock::{
    DistributedLockService, LockServiceRegistry, AUTO_BALANCER_LOCK_SERVICE, AUTO_BALANCE_LOCK,
};
use crate::stats::StatsSink;

/// Cluster operations needed by one audit cycle.
#[async_trait]
pub trait ClusterCoordinationFacade: Send + Sync {
    /// Count one audit attempt. Failures are logged and otherwise ignored.
    async fn increment_attempt_counter(&self);

    /// Try once, without waiting, to take the `auto-balance` lock.
    async fn try_acquire_lock(&self) -> bool;

    /// Release the `auto-balance` lock.
    ///
    /// # Errors
    ///
    /// `BalancerError::LockNotOwned` if another member holds the lock, or a
    /// lock service failure.
    async fn release_lock(&self) -> Result<(), BalancerError>;

    /// Run one rebalance and report what moved.
    async fn run_rebalance(&self) -> Result<RebalanceOutcome, BalancerError>;
}

/// Production facade for one member.
///
/// The lock service handle is resolved once, at construction, and kept.
pub struct GridFacade {
    member: MemberId,
    lock_service: Arc<dyn DistributedLockService>,
    engine: Arc<dyn RebalanceEngine>,
    stats: Arc<dyn StatsSink>,
    mode: RebalanceMode,
}

impl GridFacade {
    pub fn new(
        member: MemberId,
        lock_service: Arc<dyn DistributedLockService>,
        engine: Arc<dyn RebalanceEngine>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            member,
            lock_service,
            engine,
            stats,
            mode: RebalanceMode::default(),
        }
    }

    /// Build a facade on the auto-balancer lock service from `locks`,
    /// creating the service if this is the first member to ask for it.
    pub fn connect(
        member: MemberId,
        locks: &LockServiceRegistry,
        engine: Arc<dyn RebalanceEngine>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        let lock_service = locks.get_or_create(AUTO_BALANCER_LOCK_SERVICE);
        Self::new(member, lock_service, engine, stats)
    }

    pub fn with_mode(mut self, mode: RebalanceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn member(&self) -> &MemberId {
        &self.member
    }

    pub fn mode(&self) -> RebalanceMode {
        self.mode
    }
}

#[async_trait]
impl ClusterCoordinationFacade for GridFacade {
    async fn increment_attempt_counter(&self) {
        if let Err(e) = self.stats.inc_auto_rebalance_attempts() {
            warn!(member = %self.member, error = %e, "Failed to count auto-rebalance attempt");
        }
    }

    async fn try_acquire_lock(&self) -> bool {
        match self
            .lock_service
            .try_lock(AUTO_BALANCE_LOCK, &self.member)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(
                    member = %self.member,
                    service = %self.lock_service.service_name(),
                    error = %e,
                    "Lock service failed, treating auto-balance lock as unavailable"
                );
                false
            }
        }
    }

    async fn release_lock(&self) -> Result<(), BalancerError> {
        self.lock_service
            .unlock(AUTO_BALANCE_LOCK, &self.member)
            .await?;
        debug!(member = %self.member, "Released auto-balance lock");
        Ok(())
    }

    async fn run_rebalance(&self) -> Result<RebalanceOutcome, BalancerError> {
        debug!(member = %self.member, mode = ?self.mode, "Starting rebalance");
        let outcome = self.engine.rebalance(self.mode).await?;

        info!(
            member = %self.member,
            simulated = outcome.simulated,
            bucket_transfers = outcome.bucket_transfers,
            bucket_transfer_bytes = outcome.bucket_transfer_bytes,
            primary_transfers = outcome.primary_transfers,
            "Rebalance completed"
        );

        if let Err(e) = self.stats.record_rebalance(&outcome) {
            warn!(member = %self.member, error = %e, "Failed to record rebalance statistics");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::InMemoryLockService;
    use crate::stats::ResourceManagerStats;
    use crate::testing::ScriptedEngine;

    struct BrokenStats;

    impl StatsSink for BrokenStats {
        fn inc_auto_rebalance_attempts(&self) -> Result<(), BalancerError> {
            Err(BalancerError::Stats("region offline".into()))
        }
        fn record_rebalance(&self, _outcome: &RebalanceOutcome) -> Result<(), BalancerError> {
            Err(BalancerError::Stats("region offline".into()))
        }
    }

    struct UnreachableLocks;

    #[async_trait]
    impl DistributedLockService for UnreachableLocks {
        fn service_name(&self) -> &str {
            AUTO_BALANCER_LOCK_SERVICE
        }
        async fn try_lock(&self, _lock: &str, _owner: &MemberId) -> Result<bool, BalancerError> {
            Err(BalancerError::Lock("no quorum".into()))
        }
        async fn unlock(&self, _lock: &str, _owner: &MemberId) -> Result<(), BalancerError> {
            Err(BalancerError::Lock("no quorum".into()))
        }
    }

    fn facade_on(
        locks: &LockServiceRegistry,
        name: &str,
        stats: Arc<ResourceManagerStats>,
    ) -> GridFacade {
        GridFacade::connect(
            MemberId::from(name),
            locks,
            Arc::new(ScriptedEngine::balanced(RebalanceOutcome::new(4, 4096))),
            stats,
        )
    }

    #[tokio::test]
    async fn test_members_share_the_named_lock_service() {
        let locks = LockServiceRegistry::new();
        let a = facade_on(&locks, "a", Arc::new(ResourceManagerStats::new()));
        let b = facade_on(&locks, "b", Arc::new(ResourceManagerStats::new()));

        assert!(a.try_acquire_lock().await);
        assert!(!b.try_acquire_lock().await);

        let service = locks.get(AUTO_BALANCER_LOCK_SERVICE).unwrap();
        assert_eq!(service.holder(AUTO_BALANCE_LOCK), Some(MemberId::from("a")));

        let err = b.release_lock().await.unwrap_err();
        assert!(matches!(err, BalancerError::LockNotOwned { .. }));

        a.release_lock().await.unwrap();
        assert!(b.try_acquire_lock().await);
    }

    #[tokio::test]
    async fn test_release_when_not_held_is_noop() {
        let locks = LockServiceRegistry::new();
        let a = facade_on(&locks, "a", Arc::new(ResourceManagerStats::new()));
        a.release_lock().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_rebalance_records_stats() {
        let locks = LockServiceRegistry::new();
        let stats = Arc::new(ResourceManagerStats::new());
        let a = facade_on(&locks, "a", Arc::clone(&stats));

        a.increment_attempt_counter().await;
        let outcome = a.run_rebalance().await.unwrap();

        assert_eq!(outcome.bucket_transfers, 4);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.auto_rebalance_attempts, 1);
        assert_eq!(snapshot.rebalances_completed, 1);
        assert_eq!(snapshot.bucket_transfer_bytes, 4096);
    }

    #[tokio::test]
    async fn test_mode_is_passed_to_engine() {
        let engine = Arc::new(ScriptedEngine::balanced(RebalanceOutcome::new(1, 1)));
        let facade = GridFacade::new(
            MemberId::from("a"),
            Arc::new(InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE)),
            Arc::clone(&engine) as Arc<dyn RebalanceEngine>,
            Arc::new(ResourceManagerStats::new()),
        );
        assert_eq!(facade.mode(), RebalanceMode::Simulate);

        let facade = facade.with_mode(RebalanceMode::Execute);
        facade.run_rebalance().await.unwrap();
        assert_eq!(engine.modes(), vec![RebalanceMode::Execute]);
    }

    #[tokio::test]
    async fn test_engine_error_skips_stats() {
        let stats = Arc::new(ResourceManagerStats::new());
        let facade = GridFacade::new(
            MemberId::from("a"),
            Arc::new(InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE)),
            Arc::new(ScriptedEngine::failing(|| {
                BalancerError::Interrupted("member left".into())
            })),
            Arc::clone(&stats) as Arc<dyn StatsSink>,
        );

        let err = facade.run_rebalance().await.unwrap_err();
        assert!(matches!(err, BalancerError::Interrupted(_)));
        assert_eq!(stats.snapshot().rebalances_completed, 0);
    }

    #[tokio::test]
    async fn test_stats_failures_are_swallowed() {
        let facade = GridFacade::new(
            MemberId::from("a"),
            Arc::new(InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE)),
            Arc::new(ScriptedEngine::balanced(RebalanceOutcome::new(1, 1))),
            Arc::new(BrokenStats),
        );

        facade.increment_attempt_counter().await;
        assert!(facade.run_rebalance().await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_service_failure_means_not_acquired() {
        let facade = GridFacade::new(
            MemberId::from("a"),
            Arc::new(UnreachableLocks),
            Arc::new(ScriptedEngine::balanced(RebalanceOutcome::default())),
            Arc::new(ResourceManagerStats::new()),
        );

        assert!(!facade.try_acquire_lock().await);
        assert!(facade.release_lock().await.is_err());
    }
}
