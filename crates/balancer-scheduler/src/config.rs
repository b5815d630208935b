//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for the audit scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timezone the cron schedule is evaluated in (IANA timezone string,
    /// e.g., "Europe/Berlin"). Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Name of the scheduler task, used in logs.
    #[serde(default = "default_task_name")]
    pub task_name: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_task_name() -> String {
    "auto-balancer".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            task_name: default_task_name(),
        }
    }
}

impl SchedulerConfig {
    /// Config evaluating the schedule in the given timezone.
    pub fn with_timezone(timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
            ..Default::default()
        }
    }

    /// Parse the configured timezone string into a chrono_tz::Tz.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the timezone string
    /// is not a valid IANA timezone identifier.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.timezone.clone()))
    }
}
