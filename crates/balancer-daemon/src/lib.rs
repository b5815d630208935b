//! Balancer daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, next-fires)
//! - `simulation`: In-process grid the `run` command balances

pub mod cli;
pub mod commands;
pub mod simulation;

pub use cli::{Cli, Commands, ModeArg};
pub use commands::{next_fires, run_cluster, show_next_fires, Cluster, ClusterMember};
pub use simulation::SimulatedGrid;
