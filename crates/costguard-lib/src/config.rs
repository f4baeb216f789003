//! Tunable rates and thresholds for the analytics engines
//!
//! Every engine receives its slice of [`AnalyticsConfig`] at construction so
//! deployments can tune pricing and thresholds without code changes.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Hourly unit prices used for savings estimates and dimension weighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateCard {
    /// Dollars per core-hour
    pub cpu_core_hour: f64,
    /// Dollars per GB-hour of memory
    pub memory_gb_hour: f64,
    /// Dollars per GB-hour of storage
    pub storage_gb_hour: f64,
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            cpu_core_hour: 0.05,
            memory_gb_hour: 0.01,
            storage_gb_hour: 0.0001,
        }
    }
}

impl RateCard {
    pub fn rate_for(&self, kind: crate::models::ResourceKind) -> f64 {
        use crate::models::ResourceKind;
        match kind {
            ResourceKind::Cpu => self.cpu_core_hour,
            ResourceKind::Memory => self.memory_gb_hour,
            ResourceKind::Storage => self.storage_gb_hour,
        }
    }
}

/// How repeated samples for the same key inside a window are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageReduction {
    /// Arithmetic mean; duplicate scrapes do not inflate usage
    #[default]
    Mean,
    /// Plain sum, for sources that emit one sample per window
    Sum,
}

/// How the bill is divided between cpu, memory and storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionWeighting {
    /// Proportional to each dimension's usage priced at the rate card
    #[default]
    RateCard,
    /// Equal split between dimensions that carry usage
    Equal,
}

/// What a rerun for an already-allocated period does to stored rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerunPolicy {
    /// Replace rows with the same (cluster, namespace, period)
    #[default]
    Replace,
    /// Keep every run's rows
    Append,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub weighting: DimensionWeighting,
    pub rerun_policy: RerunPolicy,
}

/// Trigger and sizing rule for one resource dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRule {
    /// Recommend when utilization falls strictly below this ratio
    pub utilization_threshold: f64,
    /// Multiplier applied to the current request
    pub reduction_factor: f64,
    /// Upper bound on the confidence score
    pub confidence_cap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub cpu: DimensionRule,
    pub memory: DimensionRule,
    pub storage: DimensionRule,
    /// Findings saving this much per month or less are dropped
    pub min_monthly_savings: f64,
    /// CPU findings above this monthly saving are high priority
    pub high_priority_savings: f64,
    /// CPU utilization below this is reported as scale-down
    pub idle_cpu_threshold: f64,
    /// Hours in the normalized savings month (24 x 30)
    pub hours_per_month: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            cpu: DimensionRule {
                utilization_threshold: 0.30,
                reduction_factor: 0.50,
                confidence_cap: 0.9,
            },
            memory: DimensionRule {
                utilization_threshold: 0.40,
                reduction_factor: 0.60,
                confidence_cap: 0.9,
            },
            storage: DimensionRule {
                utilization_threshold: 0.20,
                reduction_factor: 0.70,
                confidence_cap: 0.8,
            },
            min_monthly_savings: 10.0,
            high_priority_savings: 50.0,
            idle_cpu_threshold: 0.05,
            hours_per_month: 24.0 * 30.0,
        }
    }
}

impl RecommendationConfig {
    pub fn rule_for(&self, kind: crate::models::ResourceKind) -> &DimensionRule {
        use crate::models::ResourceKind;
        match kind {
            ResourceKind::Cpu => &self.cpu,
            ResourceKind::Memory => &self.memory,
            ResourceKind::Storage => &self.storage,
        }
    }
}

/// Bounds on forecast requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Most calendar months of history a forecast may fit
    pub max_history_months: usize,
    /// Most months a forecast may project
    pub max_horizon: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            max_history_months: 24,
            max_horizon: crate::analyzer::DEFAULT_MAX_HORIZON,
        }
    }
}

/// Complete analytics configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub rates: RateCard,
    pub usage_reduction: UsageReduction,
    pub allocation: AllocationConfig,
    pub recommendations: RecommendationConfig,
    pub forecast: ForecastConfig,
}

impl AnalyticsConfig {
    /// Reject values that would make the engines produce nonsense
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("rates.cpu_core_hour", self.rates.cpu_core_hour),
            ("rates.memory_gb_hour", self.rates.memory_gb_hour),
            ("rates.storage_gb_hour", self.rates.storage_gb_hour),
        ];
        for (field, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::new(field, format!("must be a non-negative number, got {}", value)));
            }
        }

        let recs = &self.recommendations;
        let rules = [("cpu", &recs.cpu), ("memory", &recs.memory), ("storage", &recs.storage)];
        for (name, rule) in rules {
            if !(0.0..=1.0).contains(&rule.utilization_threshold) {
                return Err(ConfigError::new(
                    format!("recommendations.{}.utilization_threshold", name),
                    "must be within [0, 1]",
                ));
            }
            if !(rule.reduction_factor > 0.0 && rule.reduction_factor <= 1.0) {
                return Err(ConfigError::new(
                    format!("recommendations.{}.reduction_factor", name),
                    "must be within (0, 1]",
                ));
            }
            if !(0.0..=1.0).contains(&rule.confidence_cap) {
                return Err(ConfigError::new(
                    format!("recommendations.{}.confidence_cap", name),
                    "must be within [0, 1]",
                ));
            }
        }

        if recs.min_monthly_savings < 0.0 {
            return Err(ConfigError::new(
                "recommendations.min_monthly_savings",
                "must not be negative",
            ));
        }
        if recs.hours_per_month <= 0.0 {
            return Err(ConfigError::new(
                "recommendations.hours_per_month",
                "must be positive",
            ));
        }
        if self.forecast.max_history_months < 2 {
            return Err(ConfigError::new("forecast.max_history_months", "must be at least 2"));
        }
        if self.forecast.max_horizon == 0 {
            return Err(ConfigError::new("forecast.max_horizon", "must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_rates() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.rates.cpu_core_hour, 0.05);
        assert_eq!(config.rates.memory_gb_hour, 0.01);
        assert_eq!(config.rates.storage_gb_hour, 0.0001);
        assert_eq!(config.recommendations.cpu.utilization_threshold, 0.30);
        assert_eq!(config.recommendations.memory.reduction_factor, 0.60);
        assert_eq!(config.recommendations.storage.confidence_cap, 0.8);
        assert_eq!(config.recommendations.min_monthly_savings, 10.0);
        assert_eq!(config.recommendations.hours_per_month, 720.0);
        assert_eq!(config.allocation.rerun_policy, RerunPolicy::Replace);
        assert_eq!(config.forecast.max_history_months, 24);
        assert_eq!(config.forecast.max_horizon, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "rates": { "cpu_core_hour": 0.08 }, "allocation": { "rerun_policy": "append" } }"#;
        let config: AnalyticsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rates.cpu_core_hour, 0.08);
        assert_eq!(config.rates.memory_gb_hour, 0.01);
        assert_eq!(config.allocation.rerun_policy, RerunPolicy::Append);
        assert_eq!(config.allocation.weighting, DimensionWeighting::RateCard);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnalyticsConfig::default();
        config.rates.memory_gb_hour = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rates.memory_gb_hour"));

        let mut config = AnalyticsConfig::default();
        config.recommendations.cpu.reduction_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalyticsConfig::default();
        config.recommendations.storage.utilization_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AnalyticsConfig::default();
        config.forecast.max_horizon = 0;
        assert!(config.validate().is_err());
    }
}
