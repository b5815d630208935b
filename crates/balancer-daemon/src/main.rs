//! Grid Auto-Balancer Daemon
//!
//! Runs the cluster-wide auto-balancing coordinator.
//!
//! # Usage
//!
//! ```bash
//! balancer-daemon run [--members N] [--schedule CRON] [--mode simulate|execute]
//! balancer-daemon next-fires "0 0 * * * *" [-n COUNT] [--timezone TZ]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/grid-balancer/config.toml)
//! 3. Environment variables (BALANCER__*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use balancer_daemon::{run_cluster, show_next_fires, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            members,
            schedule,
            mode,
        } => {
            run_cluster(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                members,
                schedule.as_deref(),
                mode.map(Into::into),
            )
            .await?;
        }
        Commands::NextFires {
            expression,
            count,
            timezone,
        } => {
            show_next_fires(&expression, count, &timezone)?;
        }
    }

    Ok(())
}
