//! # balancer-types
//!
//! Shared domain types for the grid auto-balancer.
//!
//! This crate defines the data structures passed between the scheduler,
//! the coordinator and the daemon:
//! - Errors: the unified `BalancerError` taxonomy
//! - Outcomes: what a rebalance and an audit cycle produced
//! - Members: identity used as the distributed lock owner
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use balancer_types::{AuditOutcome, RebalanceOutcome};
//!
//! let outcome = AuditOutcome::Rebalanced(RebalanceOutcome::new(4, 4096));
//! assert!(outcome.is_rebalanced());
//! ```

pub mod config;
pub mod error;
pub mod member;
pub mod outcome;

pub use config::{AutoBalanceSettings, Properties, RebalanceMode, Settings, SCHEDULE};
pub use error::BalancerError;
pub use member::MemberId;
pub use outcome::{AuditOutcome, RebalanceOutcome};
