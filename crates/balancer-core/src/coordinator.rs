//! The per-member auto-balancing coordinator.
//!
//! `AutoBalancer` wires a clock, a scheduler and a locking auditor over the
//! member's cluster facade. It is created at member startup and initialized
//! from the member's properties.

use std::sync::Arc;

use tracing::{error, info, warn};

use balancer_scheduler::{
    AuditScheduler, AuditStatus, Auditor, Clock, CronScheduler, SchedulerConfig, SchedulerState,
    SystemClock,
};
use balancer_types::{AutoBalanceSettings, BalancerError, Properties, SCHEDULE};

use crate::auditor::LockingAuditor;
use crate::facade::ClusterCoordinationFacade;

/// Builder for `AutoBalancer`.
///
/// Every collaborator can be substituted. Anything left unset gets the
/// production implementation. The auditor is either supplied directly or
/// built as a `LockingAuditor` over the facade, never both.
#[derive(Default)]
pub struct AutoBalancerBuilder {
    facade: Option<Arc<dyn ClusterCoordinationFacade>>,
    scheduler_config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    auditor: Option<Arc<dyn Auditor>>,
    scheduler: Option<Arc<dyn AuditScheduler>>,
}

impl AutoBalancerBuilder {
    pub fn facade(mut self, facade: Arc<dyn ClusterCoordinationFacade>) -> Self {
        self.facade = Some(facade);
        self
    }

    pub fn scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    /// Evaluate the schedule in the timezone from `settings`.
    pub fn settings(mut self, settings: &AutoBalanceSettings) -> Self {
        self.scheduler_config.timezone = settings.timezone.clone();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn auditor(mut self, auditor: Arc<dyn Auditor>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn AuditScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Wire the coordinator.
    ///
    /// # Errors
    ///
    /// `BalancerError::Config` when neither or both of a facade and an
    /// auditor were supplied, or when the scheduler timezone is invalid.
    pub fn build(self) -> Result<AutoBalancer, BalancerError> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let auditor: Arc<dyn Auditor> = match (self.auditor, self.facade) {
            (Some(auditor), None) => auditor,
            (None, Some(facade)) => Arc::new(LockingAuditor::new(facade)),
            (Some(_), Some(_)) => {
                return Err(BalancerError::Config(
                    "auto-balancer takes a cluster facade or an auditor, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(BalancerError::Config(
                    "auto-balancer needs a cluster facade or an auditor".to_string(),
                ))
            }
        };

        let (scheduler, cron) = match self.scheduler {
            Some(scheduler) => (scheduler, None),
            None => {
                let cron = Arc::new(CronScheduler::new(
                    self.scheduler_config,
                    Arc::clone(&clock),
                    Arc::clone(&auditor),
                )?);
                (Arc::clone(&cron) as Arc<dyn AuditScheduler>, Some(cron))
            }
        };

        Ok(AutoBalancer {
            scheduler,
            cron,
            auditor,
            clock,
        })
    }
}

/// Auto-balancing coordinator of one member.
pub struct AutoBalancer {
    scheduler: Arc<dyn AuditScheduler>,
    cron: Option<Arc<CronScheduler>>,
    auditor: Arc<dyn Auditor>,
    clock: Arc<dyn Clock>,
}

impl AutoBalancer {
    /// Production coordinator over `facade`.
    pub fn new(facade: Arc<dyn ClusterCoordinationFacade>) -> Result<Self, BalancerError> {
        Self::builder().facade(facade).build()
    }

    pub fn builder() -> AutoBalancerBuilder {
        AutoBalancerBuilder::default()
    }

    /// Start auto-balancing with the schedule found under `schedule` in
    /// `props`.
    ///
    /// # Errors
    ///
    /// `BalancerError::Config` if the schedule is missing or invalid. No
    /// timer is armed in that case and the member keeps running without
    /// auto-balancing.
    ///
    /// `BalancerError::Lifecycle` if the scheduler is already armed or was
    /// stopped. Its state is left as it was.
    pub fn init(&self, props: &Properties) -> Result<(), BalancerError> {
        let schedule = props.get(SCHEDULE).map(String::as_str).unwrap_or("");

        self.scheduler.init(schedule).map_err(|e| {
            if e.is_configuration_error() {
                error!(schedule = %schedule, error = %e, "Auto-balancing disabled");
            } else {
                warn!(
                    schedule = %schedule,
                    state = ?self.scheduler.state(),
                    error = %e,
                    "Auto-balancer init rejected"
                );
            }
            BalancerError::from(e)
        })?;

        info!(schedule = %schedule, "Auto-balancing enabled");
        Ok(())
    }

    pub fn init_from_settings(&self, settings: &AutoBalanceSettings) -> Result<(), BalancerError> {
        self.init(&settings.to_properties())
    }

    /// Cancel future audits. A running audit finishes normally.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Stop and wait for an audit still in flight.
    pub async fn shutdown(&self) {
        match &self.cron {
            Some(cron) => cron.shutdown().await,
            None => self.scheduler.stop(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Audit loop status. Only available with the built-in scheduler.
    pub fn status(&self) -> Option<AuditStatus> {
        self.cron.as_ref().map(|cron| cron.status())
    }

    pub fn auditor(&self) -> &Arc<dyn Auditor> {
        &self.auditor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
