//! Cluster-wide named locks.
//!
//! The lock service is an external collaborator: it provides mutual
//! exclusion and detects crashed holders. `InMemoryLockService` implements
//! the same contract inside one process, which is enough for members that
//! share an address space and for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use balancer_types::{BalancerError, MemberId};

/// Name of the lock service the auto-balancer uses, kept apart from other
/// subsystems' locks.
pub const AUTO_BALANCER_LOCK_SERVICE: &str = "__AUTO_B";

/// The single resource whose ownership grants the right to rebalance.
pub const AUTO_BALANCE_LOCK: &str = "auto-balance";

/// Named, cluster-wide mutual exclusion.
#[async_trait]
pub trait DistributedLockService: Send + Sync {
    /// Name of this lock service.
    fn service_name(&self) -> &str;

    /// Try once to take `lock` for `owner`.
    ///
    /// Returns `Ok(false)` immediately when the lock is held, including when
    /// `owner` itself already holds it. Never waits.
    async fn try_lock(&self, lock: &str, owner: &MemberId) -> Result<bool, BalancerError>;

    /// Release `lock` held by `owner`.
    ///
    /// Releasing a lock nobody holds is a no-op. Releasing a lock held by
    /// another member fails with `BalancerError::LockNotOwned`.
    async fn unlock(&self, lock: &str, owner: &MemberId) -> Result<(), BalancerError>;
}

/// Lock service shared by members living in the same process.
pub struct InMemoryLockService {
    name: String,
    holders: Mutex<HashMap<String, MemberId>>,
}

impl InMemoryLockService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holders: Mutex::new(HashMap::new()),
        }
    }

    /// Current holder of `lock`, if any.
    pub fn holder(&self, lock: &str) -> Option<MemberId> {
        self.holders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(lock)
            .cloned()
    }

    /// Drop every lock held by a member that left the cluster.
    ///
    /// This is the failure-detection half of the lock service contract.
    /// Returns the number of locks freed.
    pub fn member_departed(&self, member: &MemberId) -> usize {
        let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());
        let before = holders.len();
        holders.retain(|_, holder| holder != member);
        let freed = before - holders.len();
        if freed > 0 {
            info!(service = %self.name, member = %member, freed, "Released locks of departed member");
        }
        freed
    }
}

#[async_trait]
impl DistributedLockService for InMemoryLockService {
    fn service_name(&self) -> &str {
        &self.name
    }

    async fn try_lock(&self, lock: &str, owner: &MemberId) -> Result<bool, BalancerError> {
        let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(holder) = holders.get(lock) {
            debug!(service = %self.name, lock, holder = %holder, requester = %owner, "Lock is held");
            return Ok(false);
        }
        holders.insert(lock.to_string(), owner.clone());
        Ok(true)
    }

    async fn unlock(&self, lock: &str, owner: &MemberId) -> Result<(), BalancerError> {
        let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());
        match holders.get(lock) {
            None => Ok(()),
            Some(holder) if holder == owner => {
                holders.remove(lock);
                Ok(())
            }
            Some(holder) => Err(BalancerError::LockNotOwned {
                lock: lock.to_string(),
                owner: holder.to_string(),
            }),
        }
    }
}

/// Directory of lock services by name.
///
/// A member asks the directory once for the service it needs and keeps the
/// returned handle.
#[derive(Default)]
pub struct LockServiceRegistry {
    services: Mutex<HashMap<String, Arc<InMemoryLockService>>>,
}

impl LockServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the service named `name`, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<InMemoryLockService> {
        let mut services = self.services.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(services.entry(name.to_string()).or_insert_with(|| {
            debug!(service = name, "Creating distributed lock service");
            Arc::new(InMemoryLockService::new(name))
        }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<InMemoryLockService>> {
        self.services
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_try_lock_is_exclusive() {
        let service = InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE);
        let a = MemberId::from("a");
        let b = MemberId::from("b");

        assert!(service.try_lock(AUTO_BALANCE_LOCK, &a).await.unwrap());
        assert!(!service.try_lock(AUTO_BALANCE_LOCK, &b).await.unwrap());
        // Not reentrant
        assert!(!service.try_lock(AUTO_BALANCE_LOCK, &a).await.unwrap());
        assert_eq!(service.holder(AUTO_BALANCE_LOCK), Some(a.clone()));

        service.unlock(AUTO_BALANCE_LOCK, &a).await.unwrap();
        assert!(service.holder(AUTO_BALANCE_LOCK).is_none());
        assert!(service.try_lock(AUTO_BALANCE_LOCK, &b).await.unwrap());
    }

    #[tokio::test]
    async fn test_locks_are_independent_by_name() {
        let service = InMemoryLockService::new("other");
        let a = MemberId::from("a");
        let b = MemberId::from("b");

        assert!(service.try_lock("x", &a).await.unwrap());
        assert!(service.try_lock("y", &b).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_semantics() {
        let service = InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE);
        let a = MemberId::from("a");
        let b = MemberId::from("b");

        // Not held: no-op
        service.unlock(AUTO_BALANCE_LOCK, &a).await.unwrap();

        service.try_lock(AUTO_BALANCE_LOCK, &a).await.unwrap();
        let err = service.unlock(AUTO_BALANCE_LOCK, &b).await.unwrap_err();
        assert!(matches!(err, BalancerError::LockNotOwned { .. }));
        assert_eq!(service.holder(AUTO_BALANCE_LOCK), Some(a));
    }

    #[tokio::test]
    async fn test_member_departed_frees_its_locks() {
        let service = InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE);
        let a = MemberId::from("a");
        let b = MemberId::from("b");

        service.try_lock(AUTO_BALANCE_LOCK, &a).await.unwrap();
        service.try_lock("other", &a).await.unwrap();

        assert_eq!(service.member_departed(&b), 0);
        assert_eq!(service.member_departed(&a), 2);
        assert!(service.try_lock(AUTO_BALANCE_LOCK, &b).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_try_lock_has_single_winner() {
        let service = Arc::new(InMemoryLockService::new(AUTO_BALANCER_LOCK_SERVICE));
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = Arc::clone(&service);
                let winners = Arc::clone(&winners);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    let member = MemberId::new(format!("member-{}", i));
                    barrier.wait().await;
                    if service.try_lock(AUTO_BALANCE_LOCK, &member).await.unwrap() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_get_or_create_returns_same_service() {
        let registry = LockServiceRegistry::new();
        assert!(registry.get(AUTO_BALANCER_LOCK_SERVICE).is_none());

        let first = registry.get_or_create(AUTO_BALANCER_LOCK_SERVICE);
        let second = registry.get_or_create(AUTO_BALANCER_LOCK_SERVICE);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.service_name(), AUTO_BALANCER_LOCK_SERVICE);
        assert!(registry.get(AUTO_BALANCER_LOCK_SERVICE).is_some());
    }
}
