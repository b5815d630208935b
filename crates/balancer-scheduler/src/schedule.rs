//! Cron schedule parsing and next-fire computation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::SchedulerError;

/// Number of fields in a schedule: second minute hour day-of-month month day-of-week.
pub const CRON_FIELDS: usize = 6;

/// Validate a cron expression.
///
/// The expression must use the 6-field format:
/// second minute hour day-of-month month day-of-week.
///
/// # Errors
///
/// Returns `SchedulerError::MissingSchedule` for an empty expression and
/// `SchedulerError::InvalidCron` for anything that does not parse.
///
/// # Example
///
/// ```
/// use balancer_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 * * * *").is_ok());  // Every hour
/// assert!(validate_cron_expression("*/10 * * * * *").is_ok()); // Every 10 seconds
///
/// assert!(validate_cron_expression("invalid").is_err());
/// assert!(validate_cron_expression("0 * * * *").is_err()); // Minute resolution only
/// assert!(validate_cron_expression("").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    parse_expression(expr).map(|_| ())
}

fn parse_expression(expr: &str) -> Result<Schedule, SchedulerError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(SchedulerError::MissingSchedule);
    }

    let fields = trimmed.split_whitespace().count();
    if fields != CRON_FIELDS {
        return Err(SchedulerError::InvalidCron(format!(
            "'{}': expected {} fields, found {}",
            expr, CRON_FIELDS, fields
        )));
    }

    Schedule::from_str(trimmed)
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// A validated cron schedule evaluated in a fixed timezone.
///
/// Construction is the only place an expression is checked, so holding a
/// `ScheduleSpec` means the expression is valid.
#[derive(Clone)]
pub struct ScheduleSpec {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl ScheduleSpec {
    /// Parse a schedule evaluated in UTC.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        Self::parse_in(expr, Tz::UTC)
    }

    /// Parse a schedule evaluated in the given timezone.
    pub fn parse_in(expr: &str, timezone: Tz) -> Result<Self, SchedulerError> {
        let schedule = parse_expression(expr)?;
        Ok(Self {
            expression: expr.trim().to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The earliest instant strictly after `from` that matches the schedule.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NoUpcomingFire` when the pattern can never
    /// match again (for example the 31st of February).
    pub fn next_after(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        let local = from.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
            .ok_or_else(|| SchedulerError::NoUpcomingFire(self.expression.clone()))
    }

    /// The next `count` fire times after `from`.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let local = from.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .take(count)
            .map(|next| next.with_timezone(&Utc))
            .collect()
    }
}

impl fmt::Debug for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleSpec")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone.name())
            .finish()
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
