//! Configuration loading for the grid auto-balancer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/grid-balancer/config.toml.

use std::collections::BTreeMap;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::BalancerError;

/// Property key holding the audit cron expression.
///
/// Any valid six-field cron string is accepted; the first field is the
/// second. For example `0 0 * * * *` audits the cluster every hour.
pub const SCHEDULE: &str = "schedule";

/// Flat key/value options handed to the coordinator at member startup.
pub type Properties = BTreeMap<String, String>;

/// How the rebalance engine is driven on each successful audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceMode {
    /// Compute the moves without transferring data (default)
    #[default]
    Simulate,
    /// Actually relocate buckets
    Execute,
}

/// Auto-balancing settings for one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBalanceSettings {
    /// Six-field cron expression for the out-of-balance audit.
    /// Auto-balancing stays disabled when this is absent.
    #[serde(default)]
    pub schedule: Option<String>,

    /// IANA timezone the schedule is evaluated in. Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Rebalance mode
    #[serde(default)]
    pub mode: RebalanceMode,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for AutoBalanceSettings {
    fn default() -> Self {
        Self {
            schedule: None,
            timezone: default_timezone(),
            mode: RebalanceMode::default(),
        }
    }
}

impl AutoBalanceSettings {
    /// Flatten into the option map consumed by the coordinator.
    ///
    /// A missing schedule is left out of the map, so the coordinator
    /// reports it as missing.
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(schedule) = &self.schedule {
            props.insert(SCHEDULE.to_string(), schedule.clone());
        }
        props
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Member identity. A random id is generated when absent.
    #[serde(default)]
    pub member_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Auto-balancing configuration
    #[serde(default)]
    pub auto_balance: AutoBalanceSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/grid-balancer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (BALANCER__*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, BalancerError> {
        let config_dir = ProjectDirs::from("", "", "grid-balancer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| BalancerError::Config(e.to_string()))?
            .set_default("auto_balance.timezone", default_timezone())
            .map_err(|e| BalancerError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: BALANCER__MEMBER_ID, BALANCER__AUTO_BALANCE__SCHEDULE, etc.
        builder = builder.add_source(
            Environment::with_prefix("BALANCER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| BalancerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| BalancerError::Config(e.to_string()))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            member_id: None,
            log_level: default_log_level(),
            auto_balance: AutoBalanceSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert!(settings.member_id.is_none());
        assert!(settings.auto_balance.schedule.is_none());
        assert_eq!(settings.auto_balance.timezone, "UTC");
        assert_eq!(settings.auto_balance.mode, RebalanceMode::Simulate);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
member_id = "server-7"
log_level = "debug"

[auto_balance]
schedule = "0 */5 * * * *"
mode = "execute"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.member_id.as_deref(), Some("server-7"));
        assert_eq!(settings.log_level, "debug");
        assert_eq!(
            settings.auto_balance.schedule.as_deref(),
            Some("0 */5 * * * *")
        );
        assert_eq!(settings.auto_balance.timezone, "UTC");
        assert_eq!(settings.auto_balance.mode, RebalanceMode::Execute);
    }

    #[test]
    fn test_load_missing_cli_file_is_config_error() {
        let result = Settings::load(Some("/definitely/not/here/balancer.toml"));
        assert!(matches!(result, Err(BalancerError::Config(_))));
    }

    #[test]
    fn test_to_properties() {
        let settings = AutoBalanceSettings {
            schedule: Some("0 0 * * * *".to_string()),
            ..Default::default()
        };
        let props = settings.to_properties();
        assert_eq!(props.get(SCHEDULE).map(String::as_str), Some("0 0 * * * *"));

        let props = AutoBalanceSettings::default().to_properties();
        assert!(props.is_empty());
    }

    #[test]
    fn test_rebalance_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&RebalanceMode::Simulate).unwrap(),
            "\"simulate\""
        );
        let mode: RebalanceMode = serde_json::from_str("\"execute\"").unwrap();
        assert_eq!(mode, RebalanceMode::Execute);
    }
}
