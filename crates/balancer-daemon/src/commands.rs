//! Command implementations for the balancer daemon.
//!
//! Handles:
//! - run: load config, build an in-process cluster, auto-balance until
//!   SIGINT/SIGTERM
//! - next-fires: print when a cron expression fires next

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::signal;
use tracing::{error, info, warn};

use balancer_core::{
    AuditStatus, AutoBalancer, GridFacade, InMemoryLockService, LockServiceRegistry, MemberId,
    ResourceManagerStats, AUTO_BALANCER_LOCK_SERVICE,
};
use balancer_scheduler::{ScheduleSpec, SchedulerConfig};
use balancer_types::{RebalanceMode, Settings};

use crate::simulation::{SimulatedGrid, DEFAULT_TOTAL_BUCKETS};

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// One member of the in-process cluster.
pub struct ClusterMember {
    pub id: MemberId,
    pub balancer: AutoBalancer,
    pub stats: Arc<ResourceManagerStats>,
}

/// Members sharing one lock service and one simulated grid.
pub struct Cluster {
    pub members: Vec<ClusterMember>,
    pub locks: LockServiceRegistry,
    pub grid: Arc<SimulatedGrid>,
}

impl Cluster {
    /// Build `size` members from `settings`. A configured member id becomes
    /// the prefix of every member's id.
    pub fn build(settings: &Settings, size: usize) -> Result<Self> {
        anyhow::ensure!(size > 0, "A cluster needs at least one member");

        let locks = LockServiceRegistry::new();
        let grid = Arc::new(SimulatedGrid::skewed(size, DEFAULT_TOTAL_BUCKETS));
        let auto_balance = &settings.auto_balance;

        let mut members = Vec::with_capacity(size);
        for index in 0..size {
            let id = match &settings.member_id {
                Some(prefix) => MemberId::new(format!("{}-{}", prefix, index)),
                None => MemberId::generate(),
            };
            let stats = Arc::new(ResourceManagerStats::new());
            let facade = GridFacade::connect(id.clone(), &locks, grid.clone(), stats.clone())
                .with_mode(auto_balance.mode);

            let balancer = AutoBalancer::builder()
                .facade(Arc::new(facade))
                .scheduler_config(SchedulerConfig {
                    timezone: auto_balance.timezone.clone(),
                    task_name: format!("auto-balancer/{}", id),
                })
                .build()
                .with_context(|| format!("Failed to build auto-balancer for member {}", id))?;

            members.push(ClusterMember {
                id,
                balancer,
                stats,
            });
        }

        Ok(Self {
            members,
            locks,
            grid,
        })
    }

    /// Initialize auto-balancing on every member. Returns how many members
    /// were armed; a member with a bad schedule keeps running without
    /// auto-balancing.
    pub fn start(&self, settings: &Settings) -> usize {
        self.members
            .iter()
            .filter(|member| match member.balancer.init_from_settings(&settings.auto_balance) {
                Ok(()) => true,
                Err(e) => {
                    warn!(member = %member.id, error = %e, "Member running without auto-balancing");
                    false
                }
            })
            .count()
    }

    /// Stop every member and wait for audits in flight.
    pub async fn shutdown(&self) {
        for member in &self.members {
            member.balancer.shutdown().await;
        }
    }

    pub fn lock_service(&self) -> Arc<InMemoryLockService> {
        self.locks.get_or_create(AUTO_BALANCER_LOCK_SERVICE)
    }
}

fn log_member_status(member: &ClusterMember) {
    let stats = member.stats.snapshot();
    match member.balancer.status() {
        Some(AuditStatus {
            attempt_count,
            rebalance_count,
            skip_count,
            error_count,
            ..
        }) => info!(
            member = %member.id,
            attempts = attempt_count,
            rebalances = rebalance_count,
            skipped = skip_count,
            errors = error_count,
            bucket_transfers = stats.bucket_transfers,
            "Member auto-balance summary"
        ),
        None => info!(member = %member.id, "Member auto-balance summary unavailable"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Run an in-process cluster until interrupted.
///
/// 1. Load layered configuration and apply CLI overrides
/// 2. Install logging
/// 3. Build `members` members over one lock service and one grid
/// 4. Arm auto-balancing on each member
/// 5. Stop every member on SIGINT/SIGTERM
pub async fn run_cluster(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    members: usize,
    schedule_override: Option<&str>,
    mode_override: Option<RebalanceMode>,
) -> Result<()> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    if let Some(schedule) = schedule_override {
        settings.auto_balance.schedule = Some(schedule.to_string());
    }
    if let Some(mode) = mode_override {
        settings.auto_balance.mode = mode;
    }

    init_logging(&settings.log_level)?;

    info!("Balancer daemon starting...");
    info!("Configuration:");
    info!("  Members: {}", members);
    info!(
        "  Schedule: {}",
        settings.auto_balance.schedule.as_deref().unwrap_or("<none>")
    );
    info!("  Timezone: {}", settings.auto_balance.timezone);
    info!("  Mode: {:?}", settings.auto_balance.mode);
    info!("  Log level: {}", settings.log_level);

    let cluster = Cluster::build(&settings, members)?;
    let armed = cluster.start(&settings);
    if armed == 0 {
        warn!("No member has auto-balancing enabled");
    }

    shutdown_signal().await;

    cluster.shutdown().await;
    for member in &cluster.members {
        log_member_status(member);
    }
    info!(layout = ?cluster.grid.layout(), "Final bucket layout");

    Ok(())
}

/// The next `count` fire times of `expression` after `from`.
pub fn next_fires(
    expression: &str,
    count: usize,
    timezone: &str,
    from: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let tz = SchedulerConfig::with_timezone(timezone)
        .parse_timezone()
        .context("Invalid timezone")?;
    let spec = ScheduleSpec::parse_in(expression, tz).context("Invalid cron expression")?;
    Ok(spec.upcoming(from, count))
}

/// Print the next fire times of a cron expression.
pub fn show_next_fires(expression: &str, count: usize, timezone: &str) -> Result<()> {
    let now = Utc::now();
    let fires = next_fires(expression, count, timezone, now)?;

    if fires.is_empty() {
        println!("'{}' never fires again", expression);
        return Ok(());
    }

    println!("Next fires of '{}' ({}):", expression, timezone);
    for fire in fires {
        let delay = fire - now;
        println!("  {}  (in {}s)", fire.to_rfc3339(), delay.num_seconds());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancer_core::{SchedulerState, AUTO_BALANCE_LOCK};
    use chrono::TimeZone;

    fn settings_with(schedule: Option<&str>) -> Settings {
        let mut settings = Settings::default();
        settings.member_id = Some("node".to_string());
        settings.auto_balance.schedule = schedule.map(str::to_string);
        settings
    }

    #[test]
    fn test_next_fires_hourly() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap();
        let fires = next_fires("0 0 * * * *", 3, "UTC", from).unwrap();
        assert_eq!(
            fires,
            vec![
                Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_next_fires_rejects_bad_input() {
        let from = Utc::now();
        assert!(next_fires("0 * * * *", 3, "UTC", from).is_err());
        assert!(next_fires("0 0 * * * *", 3, "Nowhere/City", from).is_err());
    }

    #[tokio::test]
    async fn test_cluster_members_share_lock_service() {
        let cluster = Cluster::build(&settings_with(None), 3).unwrap();
        assert_eq!(cluster.members.len(), 3);
        assert_eq!(cluster.members[0].id.as_str(), "node-0");
        assert_eq!(cluster.members[2].id.as_str(), "node-2");
        assert_eq!(cluster.grid.layout(), vec![DEFAULT_TOTAL_BUCKETS, 0, 0]);

        let service = cluster.lock_service();
        assert!(service.holder(AUTO_BALANCE_LOCK).is_none());
        assert!(Arc::ptr_eq(&service, &cluster.lock_service()));
    }

    #[test]
    fn test_cluster_requires_members() {
        assert!(Cluster::build(&settings_with(None), 0).is_err());
    }

    #[tokio::test]
    async fn test_start_without_schedule_arms_nobody() {
        let cluster = Cluster::build(&settings_with(None), 2).unwrap();
        assert_eq!(cluster.start(&settings_with(None)), 0);
        for member in &cluster.members {
            assert_eq!(member.balancer.state(), SchedulerState::Uninitialized);
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let settings = settings_with(Some("0 0 0 1 1 *"));
        let cluster = Cluster::build(&settings, 2).unwrap();
        assert_eq!(cluster.start(&settings), 2);

        cluster.shutdown().await;
        for member in &cluster.members {
            assert_eq!(member.balancer.state(), SchedulerState::Stopped);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cluster_evens_out_grid() {
        let mut settings = settings_with(Some("*/10 * * * * *"));
        settings.auto_balance.mode = RebalanceMode::Execute;
        let cluster = Cluster::build(&settings, 3).unwrap();
        cluster.start(&settings);

        tokio::time::sleep(std::time::Duration::from_secs(11)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        cluster.shutdown().await;

        let attempts: u64 = cluster
            .members
            .iter()
            .map(|m| m.stats.auto_rebalance_attempts())
            .sum();
        assert!(attempts >= 3);
        assert_eq!(cluster.grid.layout().iter().sum::<u64>(), DEFAULT_TOTAL_BUCKETS);
        assert_eq!(cluster.grid.layout(), vec![38, 38, 37]);
    }
}
