//! Service configuration
//!
//! Values come from an optional config file named by `COSTGUARD_CONFIG`,
//! then `COSTGUARD_*` environment variables. Nested keys use `__`, e.g.
//! `COSTGUARD_SCHEDULE__MAX_RETRIES=5` or
//! `COSTGUARD_ANALYTICS__RATES__CPU_CORE_HOUR=0.04`.

use anyhow::{Context, Result};
use costguard_lib::scheduler::ScheduleConfig;
use costguard_lib::AnalyticsConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_FILE_ENV: &str = "COSTGUARD_CONFIG";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name attached to structured log events
    pub service_name: String,

    /// API server port for health, metrics and queries
    pub api_port: u16,

    /// JSON file of usage samples and bill records loaded at startup
    pub seed_file: Option<PathBuf>,

    /// Job cadence, clusters and retry policy
    pub schedule: ScheduleConfig,

    /// Rate card, allocation and recommendation settings
    pub analytics: AnalyticsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "costguard".to_string(),
            api_port: 8080,
            seed_file: None,
            schedule: ScheduleConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the file named by `COSTGUARD_CONFIG` (if set)
    /// and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("COSTGUARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("schedule.clusters"),
            )
            .build()
            .with_context(|| match file {
                Some(path) => format!("Failed to read config file {}", path.display()),
                None => "Failed to read configuration from the environment".to_string(),
            })?;

        let config: ServiceConfig = settings
            .try_deserialize()
            .context("Invalid service configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analytics.validate()?;
        if self.schedule.clusters.iter().any(|c| c.trim().is_empty()) {
            anyhow::bail!("schedule.clusters must not contain empty names");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costguard_lib::scheduler::AllocationGranularity;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ServiceConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.service_name, "costguard");
        assert_eq!(config.schedule.clusters, vec!["default".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            r#"
api_port = 9100
seed_file = "/var/lib/costguard/seed.json"

[schedule]
clusters = ["prod", "staging"]
max_retries = 5
allocation_granularity = "day"

[analytics.rates]
cpu_core_hour = 0.04
"#,
        );

        let config = ServiceConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.seed_file, Some(PathBuf::from("/var/lib/costguard/seed.json")));
        assert_eq!(config.schedule.clusters, vec!["prod", "staging"]);
        assert_eq!(config.schedule.max_retries, 5);
        assert_eq!(config.schedule.allocation_granularity, AllocationGranularity::Day);
        assert_eq!(config.analytics.rates.cpu_core_hour, 0.04);
        // untouched values keep their defaults
        assert_eq!(config.analytics.rates.memory_gb_hour, 0.01);
        assert_eq!(config.schedule.forecast_horizon, 3);
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        let file = write_config(
            r#"
[analytics.rates]
cpu_core_hour = -1.0
"#,
        );

        let err = ServiceConfig::load_from(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("cpu_core_hour"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ServiceConfig::load_from(Some(Path::new("/nonexistent/costguard.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
