//! Cluster-wide auto-balancing coordinator.
//!
//! Every member of the grid runs one `AutoBalancer`. On each scheduled fire
//! the member counts an attempt, tries to take the cluster-wide
//! `auto-balance` lock, and only if it wins runs a rebalance. The lock is
//! released on every exit path, so at most one member rebalances at a time
//! and a failed rebalance never blocks the next one.
//!
//! # Example
//!
//! ```ignore
//! use balancer_core::{AutoBalancer, GridFacade, LockServiceRegistry, ResourceManagerStats};
//!
//! let locks = LockServiceRegistry::new();
//! let facade = GridFacade::connect(member_id, &locks, engine, Arc::new(ResourceManagerStats::new()));
//!
//! let balancer = AutoBalancer::new(Arc::new(facade))?;
//! balancer.init(&props)?; // props["schedule"] = "0 0 * * * *"
//! ```

mod auditor;
mod coordinator;
mod engine;
mod facade;
mod lock;
mod stats;

pub mod testing;

pub use auditor::LockingAuditor;
pub use coordinator::{AutoBalancer, AutoBalancerBuilder};
pub use engine::RebalanceEngine;
pub use facade::{ClusterCoordinationFacade, GridFacade};
pub use lock::{
    DistributedLockService, InMemoryLockService, LockServiceRegistry, AUTO_BALANCER_LOCK_SERVICE,
    AUTO_BALANCE_LOCK,
};
pub use stats::{ResourceManagerStats, StatsSink, StatsSnapshot};

pub use balancer_scheduler::{AuditScheduler, AuditStatus, Auditor, Clock, SchedulerState};
pub use balancer_types::{
    AuditOutcome, AutoBalanceSettings, BalancerError, MemberId, Properties, RebalanceMode,
    RebalanceOutcome, SCHEDULE,
};
