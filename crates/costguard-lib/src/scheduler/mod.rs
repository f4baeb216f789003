//! Cadence-driven execution of the pipeline jobs
//!
//! [`SchedulerLoop`] ticks one interval per job kind and hands each tick to
//! [`JobRunner`], which serializes runs per (job kind, cluster) and retries
//! transient failures with a fixed backoff.

mod r#loop;
mod runner;

pub use r#loop::SchedulerLoop;
pub use runner::{JobOutcome, JobReport, JobRunner};

use crate::health::components;
use crate::models::ComparisonKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Allocation,
    Comparison,
    Forecast,
    Recommendations,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Allocation,
        JobKind::Comparison,
        JobKind::Forecast,
        JobKind::Recommendations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Allocation => "allocation",
            JobKind::Comparison => "comparison",
            JobKind::Forecast => "forecast",
            JobKind::Recommendations => "recommendations",
        }
    }

    /// Health registry component tracking this job
    pub fn component(&self) -> &'static str {
        match self {
            JobKind::Allocation => components::ALLOCATION,
            JobKind::Comparison => components::COMPARISON,
            JobKind::Forecast => components::FORECAST,
            JobKind::Recommendations => components::RECOMMENDATIONS,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allocation" | "allocate" => Ok(JobKind::Allocation),
            "comparison" | "compare" => Ok(JobKind::Comparison),
            "forecast" => Ok(JobKind::Forecast),
            "recommendations" | "recommend" => Ok(JobKind::Recommendations),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// Window the scheduled allocation job allocates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationGranularity {
    /// The calendar month containing the run, recomputed on every tick
    #[default]
    Month,
    /// The last complete UTC day; needed for week-over-week comparisons
    Day,
}

/// Cadence and retry settings for the scheduled jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Clusters every job runs for
    pub clusters: Vec<String>,
    pub allocation_interval_secs: u64,
    pub comparison_interval_secs: u64,
    pub recommendation_interval_secs: u64,
    pub forecast_interval_secs: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    pub retry_backoff_secs: u64,
    pub allocation_granularity: AllocationGranularity,
    /// Bill resource group per cluster; clusters without one get the whole bill
    pub resource_groups: BTreeMap<String, String>,
    pub comparison_kinds: Vec<ComparisonKind>,
    pub recommendation_days_back: u32,
    pub forecast_history_months: usize,
    pub forecast_horizon: usize,
    /// Consecutive failed runs before a job is reported unhealthy
    pub unhealthy_after: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            clusters: vec!["default".to_string()],
            allocation_interval_secs: 30 * 60,
            comparison_interval_secs: 60 * 60,
            recommendation_interval_secs: 2 * 60 * 60,
            forecast_interval_secs: 6 * 60 * 60,
            max_retries: 3,
            retry_backoff_secs: 60,
            allocation_granularity: AllocationGranularity::Month,
            resource_groups: BTreeMap::new(),
            comparison_kinds: vec![ComparisonKind::MonthOverMonth],
            recommendation_days_back: 7,
            forecast_history_months: 6,
            forecast_horizon: 3,
            unhealthy_after: crate::health::DEFAULT_UNHEALTHY_AFTER,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self, kind: JobKind) -> Duration {
        let secs = match kind {
            JobKind::Allocation => self.allocation_interval_secs,
            JobKind::Comparison => self.comparison_interval_secs,
            JobKind::Forecast => self.forecast_interval_secs,
            JobKind::Recommendations => self.recommendation_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_defaults() {
        let config = ScheduleConfig::default();
        assert_eq!(config.interval(JobKind::Allocation), Duration::from_secs(1800));
        assert_eq!(config.interval(JobKind::Comparison), Duration::from_secs(3600));
        assert_eq!(config.interval(JobKind::Recommendations), Duration::from_secs(7200));
        assert_eq!(config.interval(JobKind::Forecast), Duration::from_secs(21600));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_job_kind_parsing() {
        assert_eq!("allocation".parse::<JobKind>().unwrap(), JobKind::Allocation);
        assert_eq!("Recommend".parse::<JobKind>().unwrap(), JobKind::Recommendations);
        assert!("collect".parse::<JobKind>().is_err());
        assert_eq!(JobKind::Forecast.to_string(), "forecast");
    }

    #[test]
    fn test_schedule_config_from_json() {
        let config: ScheduleConfig = serde_json::from_str(
            r#"{ "clusters": ["prod", "staging"], "comparison_kinds": ["month-over-month", "week-over-week"], "allocation_granularity": "day" }"#,
        )
        .unwrap();
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.comparison_kinds.len(), 2);
        assert_eq!(config.allocation_granularity, AllocationGranularity::Day);
        assert_eq!(config.forecast_horizon, 3);
    }
}
