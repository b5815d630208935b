//! Error types for the scheduler crate.
//!
//! Covers cron expression validation, timezone parsing, and the
//! scheduler lifecycle.

use thiserror::Error;

use balancer_types::BalancerError;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No schedule was configured
    #[error("Missing configuration: schedule")]
    MissingSchedule,

    /// Invalid cron expression
    #[error("Invalid schedule: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The schedule can never fire again
    #[error("Schedule '{0}' has no upcoming fire time")]
    NoUpcomingFire(String),

    /// Scheduler is already armed
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler was stopped and cannot be re-armed
    #[error("Scheduler is stopped")]
    Stopped,

    /// `init` was called outside of a tokio runtime
    #[error("No async runtime available to run the audit loop")]
    NoRuntime,
}

impl SchedulerError {
    /// Whether this error comes from bad configuration rather than lifecycle misuse.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::MissingSchedule
                | SchedulerError::InvalidCron(_)
                | SchedulerError::InvalidTimezone(_)
                | SchedulerError::NoUpcomingFire(_)
        )
    }
}

impl From<SchedulerError> for BalancerError {
    fn from(err: SchedulerError) -> Self {
        if err.is_configuration_error() {
            BalancerError::Config(err.to_string())
        } else {
            BalancerError::Lifecycle(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::MissingSchedule;
        assert_eq!(err.to_string(), "Missing configuration: schedule");

        let err = SchedulerError::InvalidCron("'* *': too few fields".to_string());
        assert!(err.to_string().contains("Invalid schedule"));

        let err = SchedulerError::InvalidTimezone("Bad/Zone".to_string());
        assert!(err.to_string().contains("Invalid timezone"));

        let err = SchedulerError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_configuration_errors_map_to_config() {
        assert!(SchedulerError::MissingSchedule.is_configuration_error());
        assert!(SchedulerError::InvalidCron("x".into()).is_configuration_error());
        assert!(!SchedulerError::AlreadyRunning.is_configuration_error());

        let err: BalancerError = SchedulerError::MissingSchedule.into();
        assert!(err.is_config());
    }

    #[test]
    fn test_lifecycle_errors_are_not_config() {
        for err in [
            SchedulerError::AlreadyRunning,
            SchedulerError::Stopped,
            SchedulerError::NoRuntime,
        ] {
            assert!(!err.is_configuration_error());
            let err: BalancerError = err.into();
            assert!(err.is_lifecycle());
            assert!(!err.is_config());
        }
    }
}
