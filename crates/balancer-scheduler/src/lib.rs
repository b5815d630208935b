//! Self-rearming cron scheduler for the out-of-balance audit.
//!
//! Each member runs one scheduler. It computes the next fire time from a
//! six-field cron expression and the current clock, sleeps until then, runs
//! the audit, and repeats. A failing or panicking audit never stops the loop.
//!
//! # Features
//!
//! - Six-field (second resolution) cron schedules, timezone aware via chrono-tz
//! - Pluggable `Clock` and `Auditor` capabilities
//! - One audit in flight per member; the next fire is armed only after the
//!   previous audit returns
//! - Stop via `CancellationToken` without interrupting a running audit
//! - Audit status observability via `AuditRegistry`
//!
//! # Example
//!
//! ```ignore
//! use balancer_scheduler::{AuditScheduler, CronScheduler, SchedulerConfig, SystemClock};
//!
//! let scheduler = CronScheduler::new(
//!     SchedulerConfig::default(),
//!     Arc::new(SystemClock),
//!     auditor,
//! )?;
//! scheduler.init("0 0 * * * *")?; // audit at the top of every hour
//!
//! let status = scheduler.status();
//! println!("next audit at {:?}", status.next_run);
//! ```

mod audit;
mod clock;
mod config;
mod error;
mod registry;
mod schedule;
mod scheduler;

pub use audit::Auditor;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use registry::{AuditRegistry, AuditStatus};
pub use schedule::{validate_cron_expression, ScheduleSpec, CRON_FIELDS};
pub use scheduler::{AuditScheduler, CronScheduler, SchedulerState};
