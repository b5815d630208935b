//! CLI argument parsing for the balancer daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand, ValueEnum};

use balancer_types::RebalanceMode;

/// Grid auto-balancer
///
/// Runs the cluster-wide auto-balancing coordinator.
#[derive(Parser, Debug)]
#[command(name = "balancer-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/grid-balancer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an in-process cluster whose members auto-balance a shared grid
    Run {
        /// Number of members in the cluster
        #[arg(short, long, default_value_t = 3)]
        members: usize,

        /// Override the audit schedule (six-field cron expression)
        #[arg(short, long)]
        schedule: Option<String>,

        /// Override the rebalance mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Print the upcoming fire times of a cron expression
    NextFires {
        /// Six-field cron expression, e.g. "0 0 * * * *"
        expression: String,

        /// How many fire times to print
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// Timezone the expression is evaluated in
        #[arg(short, long, default_value = "UTC")]
        timezone: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Simulate,
    Execute,
}

impl From<ModeArg> for RebalanceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Simulate => RebalanceMode::Simulate,
            ModeArg::Execute => RebalanceMode::Execute,
        }
    }
}
