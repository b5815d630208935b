//! Self-rearming cron scheduler for the out-of-balance audit.
//!
//! On every fire the scheduler:
//! 1. runs the audit and waits for it to return
//! 2. computes delay = next slot - current time
//! 3. arms a one-shot timer for that delay
//!
//! The delay is always recomputed from the clock after the audit, never from
//! the previous slot, so a slow audit cannot make later fires drift.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use balancer_types::AuditOutcome;

use crate::{AuditRegistry, AuditStatus, Auditor, Clock, ScheduleSpec, SchedulerConfig, SchedulerError};

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Not armed yet, or the last `init` was rejected
    Uninitialized,
    /// A fire is pending or an audit is running
    Armed,
    /// No further fires will occur
    Stopped,
}

/// Drives audits on a cron schedule.
pub trait AuditScheduler: Send + Sync {
    /// Validate `schedule` and arm the first fire.
    ///
    /// # Errors
    ///
    /// Configuration errors leave the scheduler `Uninitialized` with no timer
    /// armed.
    fn init(&self, schedule: &str) -> Result<(), SchedulerError>;

    /// Cancel the pending fire. An audit already running is not interrupted.
    fn stop(&self);

    fn state(&self) -> SchedulerState;
}

struct Inner {
    state: SchedulerState,
    task: Option<JoinHandle<()>>,
}

/// Production scheduler: one background task per member running the audit
/// loop.
pub struct CronScheduler {
    config: SchedulerConfig,
    timezone: Tz,
    clock: Arc<dyn Clock>,
    auditor: Arc<dyn Auditor>,
    registry: Arc<AuditRegistry>,
    shutdown_token: CancellationToken,
    inner: Mutex<Inner>,
}

impl CronScheduler {
    /// Create a scheduler. Nothing is armed until `init` is called.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the configured timezone
    /// is not recognized.
    pub fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        auditor: Arc<dyn Auditor>,
    ) -> Result<Self, SchedulerError> {
        let timezone = config.parse_timezone()?;
        let registry = Arc::new(AuditRegistry::new(&config.task_name));

        Ok(Self {
            config,
            timezone,
            clock,
            auditor,
            registry,
            shutdown_token: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: SchedulerState::Uninitialized,
                task: None,
            }),
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Shared handle to the audit status registry.
    pub fn registry(&self) -> Arc<AuditRegistry> {
        Arc::clone(&self.registry)
    }

    /// Snapshot of the audit loop status.
    pub fn status(&self) -> AuditStatus {
        self.registry.status()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Stop the scheduler and wait for the background task to exit,
    /// including any audit still in flight.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.lock_inner().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(task = %self.config.task_name, error = %e, "Audit loop ended abnormally");
            }
        }
    }
}

impl AuditScheduler for CronScheduler {
    fn init(&self, schedule: &str) -> Result<(), SchedulerError> {
        debug!(task = %self.config.task_name, schedule = %schedule, "Initializing audit scheduler");

        let mut inner = self.lock_inner();
        match inner.state {
            SchedulerState::Armed => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            SchedulerState::Uninitialized => {}
        }

        let spec = ScheduleSpec::parse_in(schedule, self.timezone)?;
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        self.registry.set_schedule(spec.expression());
        info!(
            task = %self.config.task_name,
            schedule = %spec,
            timezone = %self.timezone.name(),
            "Out-of-balance audit scheduled"
        );

        let audit_loop = AuditLoop {
            task_name: self.config.task_name.clone(),
            spec,
            clock: Arc::clone(&self.clock),
            auditor: Arc::clone(&self.auditor),
            registry: Arc::clone(&self.registry),
            token: self.shutdown_token.clone(),
        };
        inner.task = Some(runtime.spawn(audit_loop.run()));
        inner.state = SchedulerState::Armed;

        Ok(())
    }

    fn stop(&self) {
        let mut inner = self.lock_inner();
        if inner.state == SchedulerState::Stopped {
            return;
        }
        self.shutdown_token.cancel();
        inner.state = SchedulerState::Stopped;
        self.registry.clear_next_run();
        info!(task = %self.config.task_name, "Audit scheduler stopped");
    }

    fn state(&self) -> SchedulerState {
        self.lock_inner().state
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// State owned by the background task.
struct AuditLoop {
    task_name: String,
    spec: ScheduleSpec,
    clock: Arc<dyn Clock>,
    auditor: Arc<dyn Auditor>,
    registry: Arc<AuditRegistry>,
    token: CancellationToken,
}

impl AuditLoop {
    async fn run(self) {
        loop {
            let now = self.clock.now();
            let next = match self.spec.next_after(now) {
                Ok(next) => next,
                Err(e) => {
                    error!(task = %self.task_name, error = %e, "Audit schedule exhausted, auto-balancing disarmed");
                    self.registry.clear_next_run();
                    break;
                }
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.registry.record_armed(next, delay_ms);

            debug!(
                task = %self.task_name,
                now = %now,
                next = %next,
                delay_ms,
                "Next out-of-balance audit armed"
            );

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            self.fire().await;

            if self.token.is_cancelled() {
                break;
            }
        }

        debug!(task = %self.task_name, "Audit loop exited");
    }

    /// Run one audit on a child task so a panic surfaces as a join error
    /// instead of killing the loop.
    async fn fire(&self) {
        self.registry.record_start(self.clock.now());
        let started = Instant::now();

        let auditor = Arc::clone(&self.auditor);
        let result = tokio::spawn(async move { auditor.execute().await }).await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(task = %self.task_name, error = %e, "Error while executing out-of-balance audit");
                AuditOutcome::failed(e.to_string())
            }
            Err(e) => {
                error!(task = %self.task_name, error = %e, "Out-of-balance audit panicked");
                AuditOutcome::failed(format!("audit panicked: {}", e))
            }
        };

        debug!(task = %self.task_name, duration_ms, outcome = ?outcome, "Out-of-balance audit finished");
        self.registry.record_complete(outcome, duration_ms);
    }
}
