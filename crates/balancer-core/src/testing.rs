//! Test doubles for the auto-balancer capabilities.
//!
//! Each double records how it was called so tests can assert on ordering
//! and counts without a real cluster.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use balancer_scheduler::{validate_cron_expression, AuditScheduler, SchedulerError, SchedulerState};
use balancer_types::{BalancerError, RebalanceMode, RebalanceOutcome};

use crate::engine::RebalanceEngine;
use crate::facade::ClusterCoordinationFacade;

type ErrorFactory = Arc<dyn Fn() -> BalancerError + Send + Sync>;

/// What a scripted rebalance does when invoked.
#[derive(Clone)]
pub enum RebalanceScript {
    /// Return the outcome immediately
    Succeed(RebalanceOutcome),
    /// Fail with a freshly built error
    Fail(ErrorFactory),
    /// Panic inside the rebalance
    Panic,
    /// Sleep, then return the outcome
    Slow(Duration, RebalanceOutcome),
    /// Wait until the gate is opened, then return the outcome
    Gate(Arc<Notify>, RebalanceOutcome),
}

impl RebalanceScript {
    pub fn fail(make: impl Fn() -> BalancerError + Send + Sync + 'static) -> Self {
        RebalanceScript::Fail(Arc::new(make))
    }

    /// Fail every run with `BalancerError::Interrupted`.
    pub fn interrupted() -> Self {
        Self::fail(|| BalancerError::Interrupted("rebalance interrupted by membership change".into()))
    }

    async fn play(&self) -> Result<RebalanceOutcome, BalancerError> {
        match self {
            RebalanceScript::Succeed(outcome) => Ok(*outcome),
            RebalanceScript::Fail(make) => Err(make()),
            RebalanceScript::Panic => panic!("rebalance engine crashed"),
            RebalanceScript::Slow(delay, outcome) => {
                tokio::time::sleep(*delay).await;
                Ok(*outcome)
            }
            RebalanceScript::Gate(gate, outcome) => {
                gate.notified().await;
                Ok(*outcome)
            }
        }
    }
}

/// One call made on a `RecordingFacade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeCall {
    IncrementAttemptCounter,
    TryAcquireLock { acquired: bool },
    RunRebalance,
    ReleaseLock,
}

/// Facade double that grants or refuses the lock on demand and records every
/// call in order.
pub struct RecordingFacade {
    grant_lock: AtomicBool,
    script: Mutex<RebalanceScript>,
    calls: Mutex<Vec<FacadeCall>>,
}

impl RecordingFacade {
    /// Facade that grants the lock and rebalances successfully.
    pub fn new() -> Self {
        Self {
            grant_lock: AtomicBool::new(true),
            script: Mutex::new(RebalanceScript::Succeed(RebalanceOutcome::new(1, 1024))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, script: RebalanceScript) -> Self {
        self.set_script(script);
        self
    }

    /// Facade whose lock is always held by someone else.
    pub fn lock_held_elsewhere() -> Self {
        let facade = Self::new();
        facade.set_grant_lock(false);
        facade
    }

    pub fn set_grant_lock(&self, grant: bool) {
        self.grant_lock.store(grant, Ordering::SeqCst);
    }

    pub fn set_script(&self, script: RebalanceScript) {
        *self.script.lock().unwrap_or_else(|e| e.into_inner()) = script;
    }

    fn record(&self, call: FacadeCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<FacadeCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, call: FacadeCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn attempts(&self) -> usize {
        self.count(FacadeCall::IncrementAttemptCounter)
    }

    pub fn rebalances(&self) -> usize {
        self.count(FacadeCall::RunRebalance)
    }

    pub fn releases(&self) -> usize {
        self.count(FacadeCall::ReleaseLock)
    }
}

impl Default for RecordingFacade {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterCoordinationFacade for RecordingFacade {
    async fn increment_attempt_counter(&self) {
        self.record(FacadeCall::IncrementAttemptCounter);
    }

    async fn try_acquire_lock(&self) -> bool {
        let acquired = self.grant_lock.load(Ordering::SeqCst);
        self.record(FacadeCall::TryAcquireLock { acquired });
        acquired
    }

    async fn release_lock(&self) -> Result<(), BalancerError> {
        self.record(FacadeCall::ReleaseLock);
        Ok(())
    }

    async fn run_rebalance(&self) -> Result<RebalanceOutcome, BalancerError> {
        self.record(FacadeCall::RunRebalance);
        let script = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        script.play().await
    }
}

/// Rebalance engine double driven by a `RebalanceScript`.
pub struct ScriptedEngine {
    script: RebalanceScript,
    modes: Mutex<Vec<RebalanceMode>>,
}

impl ScriptedEngine {
    pub fn new(script: RebalanceScript) -> Self {
        Self {
            script,
            modes: Mutex::new(Vec::new()),
        }
    }

    /// Engine that always reports `outcome`.
    pub fn balanced(outcome: RebalanceOutcome) -> Self {
        Self::new(RebalanceScript::Succeed(outcome))
    }

    pub fn failing(make: impl Fn() -> BalancerError + Send + Sync + 'static) -> Self {
        Self::new(RebalanceScript::fail(make))
    }

    /// Modes the engine was invoked with, in order.
    pub fn modes(&self) -> Vec<RebalanceMode> {
        self.modes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls(&self) -> usize {
        self.modes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl RebalanceEngine for ScriptedEngine {
    async fn rebalance(&self, mode: RebalanceMode) -> Result<RebalanceOutcome, BalancerError> {
        self.modes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mode);
        let outcome = self.script.play().await?;
        Ok(match mode {
            RebalanceMode::Simulate => outcome.simulated(),
            RebalanceMode::Execute => outcome,
        })
    }
}

/// Scheduler double that validates and records `init` calls but never fires.
pub struct RecordingScheduler {
    inits: Mutex<Vec<String>>,
    state: Mutex<SchedulerState>,
    stops: AtomicUsize,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self {
            inits: Mutex::new(Vec::new()),
            state: Mutex::new(SchedulerState::Uninitialized),
            stops: AtomicUsize::new(0),
        }
    }

    /// Schedules passed to `init`, accepted or not.
    pub fn inits(&self) -> Vec<String> {
        self.inits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for RecordingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditScheduler for RecordingScheduler {
    fn init(&self, schedule: &str) -> Result<(), SchedulerError> {
        self.inits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(schedule.to_string());

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            SchedulerState::Armed => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            SchedulerState::Uninitialized => {}
        }
        validate_cron_expression(schedule)?;
        *state = SchedulerState::Armed;
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SchedulerState::Stopped;
    }

    fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
